//! CSR graph store.
//!
//! Topology is immutable after construction; the only mutable per-vertex
//! state is the block label, held in an atomic cell so the serialized apply
//! phase of parallel refinement can write through `&self` while exploration
//! threads read. Undirected edges are stored as two directed arcs with equal
//! weight.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::PartitionError;
use crate::graph::{BlockId, EdgeId, EdgeWeight, NodeId, NodeWeight};

/// Immutable-topology graph with mutable block labels.
#[derive(Debug)]
pub struct CsrGraph {
    first_edge: Vec<EdgeId>,
    targets: Vec<NodeId>,
    edge_weights: Vec<EdgeWeight>,
    node_weights: Vec<NodeWeight>,
    blocks: Vec<AtomicU32>,
    second_blocks: Option<Vec<AtomicU32>>,
    block_count: u32,
}

impl CsrGraph {
    /// Bulk construction from prebuilt CSR arrays.
    pub fn from_csr(
        node_weights: Vec<NodeWeight>,
        first_edge: Vec<EdgeId>,
        targets: Vec<NodeId>,
        edge_weights: Vec<EdgeWeight>,
    ) -> Result<Self, PartitionError> {
        let n = node_weights.len();
        if first_edge.len() != n + 1 {
            return Err(PartitionError::InvariantViolation(format!(
                "CSR offsets length {} does not match {} nodes",
                first_edge.len(),
                n
            )));
        }
        if *first_edge.last().unwrap_or(&0) != targets.len()
            || targets.len() != edge_weights.len()
        {
            return Err(PartitionError::InvariantViolation(
                "CSR edge arrays are inconsistent".into(),
            ));
        }
        if first_edge.windows(2).any(|w| w[0] > w[1]) {
            return Err(PartitionError::InvariantViolation(
                "CSR offsets are not monotone".into(),
            ));
        }
        let blocks = (0..n).map(|_| AtomicU32::new(0)).collect();
        Ok(Self {
            first_edge,
            targets,
            edge_weights,
            node_weights,
            blocks,
            second_blocks: None,
            block_count: 1,
        })
    }

    /// Number of vertices.
    #[inline]
    pub fn n(&self) -> usize {
        self.node_weights.len()
    }

    /// Number of directed arcs (twice the undirected edge count).
    #[inline]
    pub fn m(&self) -> usize {
        self.targets.len()
    }

    /// Arc index range of `v`'s out-edges.
    #[inline]
    pub fn edges_of(&self, v: NodeId) -> std::ops::Range<EdgeId> {
        self.first_edge[v as usize]..self.first_edge[v as usize + 1]
    }

    /// Head of arc `e`.
    #[inline]
    pub fn target(&self, e: EdgeId) -> NodeId {
        self.targets[e]
    }

    /// Weight of arc `e`.
    #[inline]
    pub fn edge_weight(&self, e: EdgeId) -> EdgeWeight {
        self.edge_weights[e]
    }

    #[inline]
    pub fn node_weight(&self, v: NodeId) -> NodeWeight {
        self.node_weights[v as usize]
    }

    #[inline]
    pub fn degree(&self, v: NodeId) -> usize {
        self.first_edge[v as usize + 1] - self.first_edge[v as usize]
    }

    /// `(target, weight)` pairs of `v`'s out-edges.
    #[inline]
    pub fn adjacent(&self, v: NodeId) -> impl Iterator<Item = (NodeId, EdgeWeight)> + '_ {
        self.edges_of(v).map(move |e| (self.targets[e], self.edge_weights[e]))
    }

    /// Largest vertex degree; O(n).
    pub fn max_degree(&self) -> usize {
        (0..self.n()).map(|v| self.degree(v as NodeId)).max().unwrap_or(0)
    }

    /// Largest single-arc weight; O(m).
    pub fn max_edge_weight(&self) -> EdgeWeight {
        self.edge_weights.iter().copied().max().unwrap_or(0)
    }

    pub fn total_node_weight(&self) -> NodeWeight {
        self.node_weights.iter().sum()
    }

    /// Block label of `v`.
    #[inline]
    pub fn block(&self, v: NodeId) -> BlockId {
        self.blocks[v as usize].load(Ordering::Relaxed)
    }

    /// Relabel `v`. During parallel refinement only the apply-phase
    /// coordinator calls this; exploration threads read stale-but-consistent
    /// labels through [`Self::block`].
    #[inline]
    pub fn set_block(&self, v: NodeId, b: BlockId) {
        self.blocks[v as usize].store(b, Ordering::Relaxed);
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn set_block_count(&mut self, k: u32) {
        self.block_count = k;
    }

    /// Allocate the secondary label array used when two partitions are combined.
    pub fn enable_second_partition(&mut self) {
        if self.second_blocks.is_none() {
            self.second_blocks = Some((0..self.n()).map(|_| AtomicU32::new(0)).collect());
        }
    }

    pub fn second_block(&self, v: NodeId) -> Option<BlockId> {
        self.second_blocks
            .as_ref()
            .map(|s| s[v as usize].load(Ordering::Relaxed))
    }

    pub fn set_second_block(&self, v: NodeId, b: BlockId) {
        if let Some(s) = &self.second_blocks {
            s[v as usize].store(b, Ordering::Relaxed);
        }
    }

    /// Snapshot of all block labels in vertex order.
    pub fn export_partition(&self) -> Vec<BlockId> {
        (0..self.n()).map(|v| self.block(v as NodeId)).collect()
    }

    /// Restore labels from a snapshot.
    pub fn import_partition(&self, labels: &[BlockId]) {
        debug_assert_eq!(labels.len(), self.n());
        for (v, &b) in labels.iter().enumerate() {
            self.set_block(v as NodeId, b);
        }
    }
}

/// Incremental CSR builder: nodes are appended in order, each followed by its
/// out-edges. The edge arrays are preallocated to an optimistic cap and
/// trimmed on [`GraphBuilder::finish`]; running past the cap is an error.
#[derive(Debug)]
pub struct GraphBuilder {
    node_weights: Vec<NodeWeight>,
    first_edge: Vec<EdgeId>,
    targets: Vec<NodeId>,
    edge_weights: Vec<EdgeWeight>,
    edge_cap: usize,
}

impl GraphBuilder {
    pub fn new(node_hint: usize, edge_cap: usize) -> Self {
        Self {
            node_weights: Vec::with_capacity(node_hint),
            first_edge: Vec::with_capacity(node_hint + 1),
            targets: Vec::with_capacity(edge_cap),
            edge_weights: Vec::with_capacity(edge_cap),
            edge_cap,
        }
    }

    /// Append the next vertex; subsequent [`Self::new_edge`] calls attach to it.
    pub fn new_node(&mut self, weight: NodeWeight) -> NodeId {
        let id = self.node_weights.len() as NodeId;
        self.node_weights.push(weight);
        self.first_edge.push(self.targets.len());
        id
    }

    /// Overwrite the weight of the most recently added vertex.
    pub fn set_last_node_weight(&mut self, weight: NodeWeight) {
        if let Some(w) = self.node_weights.last_mut() {
            *w = weight;
        }
    }

    /// Append an out-arc of the most recently added vertex.
    pub fn new_edge(
        &mut self,
        target: NodeId,
        weight: EdgeWeight,
    ) -> Result<EdgeId, PartitionError> {
        if self.targets.len() == self.edge_cap {
            return Err(PartitionError::BuilderOverflow(self.edge_cap + 1));
        }
        let e = self.targets.len();
        self.targets.push(target);
        self.edge_weights.push(weight);
        Ok(e)
    }

    /// Number of arcs appended so far.
    pub fn edges_built(&self) -> usize {
        self.targets.len()
    }

    /// Target of an already-appended arc.
    pub fn built_target(&self, e: EdgeId) -> NodeId {
        self.targets[e]
    }

    /// Fold additional weight into an already-appended arc; used by the
    /// contractor to collapse multi-edges in place.
    pub fn add_edge_weight(&mut self, e: EdgeId, weight: EdgeWeight) {
        self.edge_weights[e] += weight;
    }

    /// Seal the CSR: close the offset array and trim the edge arrays.
    pub fn finish(mut self) -> Result<CsrGraph, PartitionError> {
        self.first_edge.push(self.targets.len());
        self.targets.shrink_to_fit();
        self.edge_weights.shrink_to_fit();
        CsrGraph::from_csr(
            self.node_weights,
            self.first_edge,
            self.targets,
            self.edge_weights,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0-1-2 path, unit weights.
    fn path3() -> CsrGraph {
        let mut b = GraphBuilder::new(3, 4);
        b.new_node(1);
        b.new_edge(1, 1).unwrap();
        b.new_node(1);
        b.new_edge(0, 1).unwrap();
        b.new_edge(2, 1).unwrap();
        b.new_node(1);
        b.new_edge(1, 1).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn builder_produces_expected_csr() {
        let g = path3();
        assert_eq!(g.n(), 3);
        assert_eq!(g.m(), 4);
        assert_eq!(g.degree(0), 1);
        assert_eq!(g.degree(1), 2);
        let nbrs: Vec<_> = g.adjacent(1).collect();
        assert_eq!(nbrs, vec![(0, 1), (2, 1)]);
        assert_eq!(g.max_degree(), 2);
        assert_eq!(g.total_node_weight(), 3);
    }

    #[test]
    fn builder_rejects_cap_overflow() {
        let mut b = GraphBuilder::new(2, 1);
        b.new_node(1);
        b.new_edge(1, 1).unwrap();
        assert!(matches!(
            b.new_edge(1, 1),
            Err(PartitionError::BuilderOverflow(_))
        ));
    }

    #[test]
    fn block_labels_round_trip() {
        let g = path3();
        g.set_block(0, 0);
        g.set_block(1, 1);
        g.set_block(2, 1);
        let snap = g.export_partition();
        g.set_block(1, 0);
        g.import_partition(&snap);
        assert_eq!(g.block(1), 1);
    }

    #[test]
    fn bulk_construction_checks_offsets() {
        let bad = CsrGraph::from_csr(vec![1, 1], vec![0, 2, 1], vec![1, 0], vec![1, 1]);
        assert!(bad.is_err());
    }
}
