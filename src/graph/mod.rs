//! Graph storage and file formats.

pub mod csr;
pub mod io;

pub use csr::{CsrGraph, GraphBuilder};

/// Vertex identifier, dense in `[0, n)`.
pub type NodeId = u32;
/// Directed arc index into the CSR arrays.
pub type EdgeId = usize;
/// Block (partition) identifier, dense in `[0, k)`.
pub type BlockId = u32;
/// Integer vertex weight.
pub type NodeWeight = i64;
/// Integer edge weight.
pub type EdgeWeight = i64;
/// Signed cut delta of a single move.
pub type Gain = i64;

/// Sentinel for "no block": returned when a vertex has no external neighbour.
pub const INVALID_BLOCK: BlockId = BlockId::MAX;
