//! Gain computation shared by the k-way refiners.

use hashbrown::HashMap;

use crate::graph::{BlockId, CsrGraph, EdgeWeight, Gain, NodeId, INVALID_BLOCK};

/// Outcome of scanning a vertex's neighbourhood: the best feasible
/// destination block, the cut reduction of moving there, and the total
/// external edge weight. `target == INVALID_BLOCK` means no external
/// neighbour, or none whose block passes the feasibility test.
#[derive(Debug, Clone, Copy)]
pub struct GainInfo {
    pub target: BlockId,
    pub gain: Gain,
    pub ext_degree: EdgeWeight,
}

/// Best-destination gain of `v` under an arbitrary block-label view.
///
/// `lookup` abstracts over the label source so the same computation serves
/// the shared graph and a thread's speculative shadow; `feasible` filters
/// candidate destinations (balance checks live there, so an overloaded
/// runner-up never shadows a feasible second choice). The gain follows the
/// usual sign convention: moving `v` realizes `cut -= gain`. Ties between
/// destinations resolve to the smallest block id, which keeps single-thread
/// runs reproducible.
pub fn compute_gain(
    graph: &CsrGraph,
    v: NodeId,
    from: BlockId,
    lookup: impl Fn(NodeId) -> BlockId,
    feasible: impl Fn(BlockId) -> bool,
) -> GainInfo {
    let mut per_block: HashMap<BlockId, EdgeWeight> = HashMap::new();
    let mut internal: EdgeWeight = 0;
    let mut ext_degree: EdgeWeight = 0;

    for (u, w) in graph.adjacent(v) {
        let b = lookup(u);
        if b == from {
            internal += w;
        } else {
            ext_degree += w;
            *per_block.entry(b).or_insert(0) += w;
        }
    }

    let mut target = INVALID_BLOCK;
    let mut best: EdgeWeight = EdgeWeight::MIN;
    for (&b, &w) in &per_block {
        if (w > best || (w == best && b < target)) && feasible(b) {
            best = w;
            target = b;
        }
    }

    if target == INVALID_BLOCK {
        return GainInfo {
            target,
            gain: 0,
            ext_degree,
        };
    }
    GainInfo {
        target,
        gain: best - internal,
        ext_degree,
    }
}

/// Gain of `v` restricted to a fixed destination block.
pub fn gain_to_block(
    graph: &CsrGraph,
    v: NodeId,
    from: BlockId,
    to: BlockId,
    lookup: impl Fn(NodeId) -> BlockId,
) -> Gain {
    let mut to_weight: EdgeWeight = 0;
    let mut internal: EdgeWeight = 0;
    for (u, w) in graph.adjacent(v) {
        let b = lookup(u);
        if b == from {
            internal += w;
        } else if b == to {
            to_weight += w;
        }
    }
    to_weight - internal
}
