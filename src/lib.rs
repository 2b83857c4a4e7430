//! # millcut
//!
//! millcut is a parallel multi-level graph partitioner: it splits the
//! vertices of a weighted undirected graph into k blocks of bounded weight
//! while minimizing the weight of edges cut between blocks. The classic
//! multi-level recipe is followed — cluster-based coarsening by parallel
//! contraction, greedy initial partitioning at the coarsest level, and
//! uncoarsening with quotient-graph-scheduled local refinement (two-way FM
//! and sequential or parallel multi-try k-way FM with speculative moves and
//! conflict-aware commits).
//!
//! ## Usage
//!
//! ```no_run
//! use millcut::config::PartitionConfig;
//! use millcut::graph::io;
//! use millcut::partitioner;
//!
//! let mut graph = io::read_graph("graph.txt")?;
//! let mut config = PartitionConfig { k: 4, seed: 1, ..Default::default() };
//! config.configure_balance(&graph);
//! config.validate()?;
//! let cut = partitioner::perform_partitioning(&config, &mut graph)?;
//! println!("cut {cut}");
//! io::write_partition(&graph, "tmppartition4")?;
//! # Ok::<(), millcut::error::PartitionError>(())
//! ```
//!
//! Parallel sections run on explicitly built, deterministically seeded rayon
//! pools; a run with a fixed seed and a fixed thread count reproduces its
//! partition exactly (across thread counts only the invariants are stable,
//! not the labels).

pub mod coarsening;
pub mod config;
pub mod error;
pub mod graph;
pub mod initial;
pub mod metrics;
pub mod parallel;
pub mod partitioner;
pub mod refinement;
pub mod rng;

/// The most-used types and entry points.
pub mod prelude {
    pub use crate::config::{
        ApplyMoveStrategy, PartitionConfig, RefinementType, SchedulerKind, StopRuleKind,
    };
    pub use crate::error::PartitionError;
    pub use crate::graph::io::{read_graph, read_partition, write_partition};
    pub use crate::graph::{BlockId, CsrGraph, EdgeWeight, Gain, NodeId, NodeWeight};
    pub use crate::metrics::{balance, boundary_nodes, edge_cut};
    pub use crate::partitioner::perform_partitioning;
}
