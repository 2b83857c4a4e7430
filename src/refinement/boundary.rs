//! Quotient boundary index.
//!
//! For every ordered block pair `(a, b)` with `a < b` and nonzero cut, the
//! index keeps the two directed boundary sets (vertices of `a` with a
//! neighbour in `b`, and vice versa) plus the pair's cut weight. Pairs whose
//! cut drops to zero are removed; pairs appearing through a move are created
//! on demand.
//!
//! The per-block aggregates (`block_no_nodes`, `block_weight`) are stored
//! here for the refiners' convenience but are maintained by the *callers*
//! around each move and rollback; [`QuotientBoundary::post_moved_updates`]
//! touches only boundary membership and cut weights.

use hashbrown::{HashMap, HashSet};

use crate::graph::{BlockId, CsrGraph, EdgeWeight, NodeId, NodeWeight};

/// Ordered block pair, `lhs < rhs`.
pub type BlockPair = (BlockId, BlockId);

#[inline]
pub fn ordered_pair(a: BlockId, b: BlockId) -> BlockPair {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Default)]
struct QuotientEdgeData {
    cut: EdgeWeight,
    /// Vertices of the pair's smaller block with a neighbour in the larger.
    lhs_boundary: HashSet<NodeId>,
    /// Vertices of the pair's larger block with a neighbour in the smaller.
    rhs_boundary: HashSet<NodeId>,
}

/// Boundary index over all active quotient edges.
#[derive(Debug)]
pub struct QuotientBoundary {
    pairs: HashMap<BlockPair, QuotientEdgeData>,
    block_no_nodes: Vec<usize>,
    block_weight: Vec<NodeWeight>,
}

impl QuotientBoundary {
    pub fn new(k: u32) -> Self {
        Self {
            pairs: HashMap::new(),
            block_no_nodes: vec![0; k as usize],
            block_weight: vec![0; k as usize],
        }
    }

    /// Rebuild the index from scratch by one scan over all vertices.
    pub fn build(graph: &CsrGraph, k: u32) -> Self {
        let mut boundary = Self::new(k);
        for v in 0..graph.n() as NodeId {
            let bv = graph.block(v);
            boundary.block_no_nodes[bv as usize] += 1;
            boundary.block_weight[bv as usize] += graph.node_weight(v);
            for (u, w) in graph.adjacent(v) {
                let bu = graph.block(u);
                if bu == bv {
                    continue;
                }
                let data = boundary.pairs.entry(ordered_pair(bv, bu)).or_default();
                // each undirected cross edge is seen from both arcs
                data.cut += w;
                if bv < bu {
                    data.lhs_boundary.insert(v);
                } else {
                    data.rhs_boundary.insert(v);
                }
            }
        }
        for data in boundary.pairs.values_mut() {
            data.cut /= 2;
        }
        boundary
    }

    /// Active quotient edges with their cut weights.
    pub fn quotient_edges(&self) -> Vec<(BlockPair, EdgeWeight)> {
        let mut edges: Vec<_> = self.pairs.iter().map(|(&p, d)| (p, d.cut)).collect();
        edges.sort_unstable_by_key(|&(p, _)| p);
        edges
    }

    pub fn edge_cut(&self, a: BlockId, b: BlockId) -> EdgeWeight {
        self.pairs
            .get(&ordered_pair(a, b))
            .map(|d| d.cut)
            .unwrap_or(0)
    }

    /// Vertices of block `a` with at least one neighbour in block `b`.
    pub fn directed_boundary(&self, a: BlockId, b: BlockId) -> Option<&HashSet<NodeId>> {
        let pair = ordered_pair(a, b);
        self.pairs.get(&pair).map(|d| {
            if a < b {
                &d.lhs_boundary
            } else {
                &d.rhs_boundary
            }
        })
    }

    /// Total boundary size of a pair, `|B(a->b)| + |B(b->a)|`.
    pub fn pair_boundary_size(&self, a: BlockId, b: BlockId) -> usize {
        self.pairs
            .get(&ordered_pair(a, b))
            .map(|d| d.lhs_boundary.len() + d.rhs_boundary.len())
            .unwrap_or(0)
    }

    /// All distinct boundary vertices, across every quotient edge.
    pub fn all_boundary_nodes(&self) -> Vec<NodeId> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        for data in self.pairs.values() {
            seen.extend(data.lhs_boundary.iter().copied());
            seen.extend(data.rhs_boundary.iter().copied());
        }
        let mut nodes: Vec<_> = seen.into_iter().collect();
        nodes.sort_unstable();
        nodes
    }

    /// Boundary vertices belonging to either of two blocks.
    pub fn boundary_nodes_of_blocks(&self, lhs: BlockId, rhs: BlockId) -> Vec<NodeId> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        for (&(a, b), data) in &self.pairs {
            if a == lhs || a == rhs {
                seen.extend(data.lhs_boundary.iter().copied());
            }
            if b == lhs || b == rhs {
                seen.extend(data.rhs_boundary.iter().copied());
            }
        }
        let mut nodes: Vec<_> = seen.into_iter().collect();
        nodes.sort_unstable();
        nodes
    }

    #[inline]
    pub fn block_weight(&self, b: BlockId) -> NodeWeight {
        self.block_weight[b as usize]
    }

    #[inline]
    pub fn block_no_nodes(&self, b: BlockId) -> usize {
        self.block_no_nodes[b as usize]
    }

    /// Caller-side aggregate update around a move of `v` from `from` to `to`.
    pub fn apply_move_aggregates(&mut self, weight: NodeWeight, from: BlockId, to: BlockId) {
        self.block_no_nodes[from as usize] -= 1;
        self.block_no_nodes[to as usize] += 1;
        self.block_weight[from as usize] -= weight;
        self.block_weight[to as usize] += weight;
    }

    fn insert_directed(&mut self, a: BlockId, b: BlockId, v: NodeId) {
        let pair = ordered_pair(a, b);
        let data = self.pairs.entry(pair).or_default();
        if a < b {
            data.lhs_boundary.insert(v);
        } else {
            data.rhs_boundary.insert(v);
        }
    }

    fn remove_directed(&mut self, a: BlockId, b: BlockId, v: NodeId) {
        let pair = ordered_pair(a, b);
        if let Some(data) = self.pairs.get_mut(&pair) {
            if a < b {
                data.lhs_boundary.remove(&v);
            } else {
                data.rhs_boundary.remove(&v);
            }
        }
    }

    fn add_cut(&mut self, a: BlockId, b: BlockId, delta: EdgeWeight) {
        let pair = ordered_pair(a, b);
        self.pairs.entry(pair).or_default().cut += delta;
    }

    /// Incremental update after `v` moved from `from` to `to`; must be called
    /// *after* `graph.set_block(v, to)`. Recomputes the membership of `v` and
    /// of each neighbour in the affected pairs and adjusts the pair cuts;
    /// pairs whose cut reaches zero disappear.
    pub fn post_moved_updates(&mut self, graph: &CsrGraph, v: NodeId, from: BlockId, to: BlockId) {
        debug_assert_eq!(graph.block(v), to);
        debug_assert_ne!(from, to);

        // neighbour blocks of v with accumulated arc weights
        let mut nb_weights: HashMap<BlockId, EdgeWeight> = HashMap::new();
        for (u, w) in graph.adjacent(v) {
            *nb_weights.entry(graph.block(u)).or_insert(0) += w;
        }

        // cut deltas
        for (&c, &w) in &nb_weights {
            if c != from {
                self.add_cut(from, c, -w);
            }
            if c != to {
                self.add_cut(to, c, w);
            }
        }

        // membership of v itself
        for &c in nb_weights.keys() {
            if c != from {
                self.remove_directed(from, c, v);
            }
            if c != to {
                self.insert_directed(to, c, v);
            }
        }

        // membership of the neighbours in the two affected pairs
        for (u, _) in graph.adjacent(v) {
            let bu = graph.block(u);
            if bu != to {
                // u gained a neighbour (v) in `to`
                self.insert_directed(bu, to, u);
            }
            if bu != from {
                // u may have lost its last neighbour in `from`
                let still = graph.adjacent(u).any(|(x, _)| graph.block(x) == from);
                if !still {
                    self.remove_directed(bu, from, u);
                }
            }
        }

        self.pairs.retain(|_, data| {
            if data.cut > 0 {
                return true;
            }
            debug_assert!(data.lhs_boundary.is_empty() && data.rhs_boundary.is_empty());
            false
        });
    }

    /// Full consistency check against a freshly built index. O(V + E); meant
    /// for debug assertions and tests, not for production paths.
    pub fn is_consistent_with(&self, graph: &CsrGraph, k: u32) -> bool {
        let fresh = Self::build(graph, k);
        if fresh.pairs.len() != self.pairs.len() {
            return false;
        }
        for (pair, data) in &fresh.pairs {
            let Some(mine) = self.pairs.get(pair) else {
                return false;
            };
            if mine.cut != data.cut
                || mine.lhs_boundary != data.lhs_boundary
                || mine.rhs_boundary != data.rhs_boundary
            {
                return false;
            }
        }
        self.block_weight == fresh.block_weight && self.block_no_nodes == fresh.block_no_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    /// 0-1-2-3 path, blocks 0,0,1,1.
    fn split_path() -> CsrGraph {
        let mut b = GraphBuilder::new(4, 6);
        for v in 0..4u32 {
            b.new_node(1);
            if v > 0 {
                b.new_edge(v - 1, 1).unwrap();
            }
            if v < 3 {
                b.new_edge(v + 1, 1).unwrap();
            }
        }
        let g = b.finish().unwrap();
        for v in 0..4 {
            g.set_block(v, if v < 2 { 0 } else { 1 });
        }
        g
    }

    #[test]
    fn build_finds_the_single_quotient_edge() {
        let g = split_path();
        let boundary = QuotientBoundary::build(&g, 2);
        assert_eq!(boundary.quotient_edges(), vec![((0, 1), 1)]);
        assert_eq!(boundary.edge_cut(0, 1), 1);
        assert_eq!(
            boundary.directed_boundary(0, 1).unwrap(),
            &[1u32].into_iter().collect::<HashSet<_>>()
        );
        assert_eq!(
            boundary.directed_boundary(1, 0).unwrap(),
            &[2u32].into_iter().collect::<HashSet<_>>()
        );
        assert_eq!(boundary.block_weight(0), 2);
        assert_eq!(boundary.block_no_nodes(1), 2);
    }

    #[test]
    fn incremental_update_tracks_a_move() {
        let g = split_path();
        let mut boundary = QuotientBoundary::build(&g, 2);

        // move node 2 into block 0: cut moves to edge (2,3)
        g.set_block(2, 0);
        boundary.post_moved_updates(&g, 2, 1, 0);
        boundary.apply_move_aggregates(g.node_weight(2), 1, 0);

        assert_eq!(boundary.edge_cut(0, 1), 1);
        assert!(boundary.directed_boundary(0, 1).unwrap().contains(&2));
        assert!(boundary.directed_boundary(1, 0).unwrap().contains(&3));
        assert!(!boundary.directed_boundary(0, 1).unwrap().contains(&1));
        assert!(boundary.is_consistent_with(&g, 2));
    }

    #[test]
    fn move_and_rollback_restore_the_index() {
        let g = split_path();
        let mut boundary = QuotientBoundary::build(&g, 2);
        let before = boundary.quotient_edges();

        g.set_block(1, 1);
        boundary.post_moved_updates(&g, 1, 0, 1);
        boundary.apply_move_aggregates(1, 0, 1);

        g.set_block(1, 0);
        boundary.post_moved_updates(&g, 1, 1, 0);
        boundary.apply_move_aggregates(1, 1, 0);

        assert_eq!(boundary.quotient_edges(), before);
        assert!(boundary.is_consistent_with(&g, 2));
    }

    #[test]
    fn pair_vanishes_when_cut_drops_to_zero() {
        // triangle 0-1-2 plus pendant 3 on node 2; blocks {0,1,2} and {3}
        let edges = [(0u32, 1u32), (1, 2), (0, 2), (2, 3)];
        let mut b = GraphBuilder::new(4, 8);
        for v in 0..4u32 {
            b.new_node(1);
            for &(x, y) in &edges {
                if x == v {
                    b.new_edge(y, 1).unwrap();
                } else if y == v {
                    b.new_edge(x, 1).unwrap();
                }
            }
        }
        let g = b.finish().unwrap();
        for v in 0..3 {
            g.set_block(v, 0);
        }
        g.set_block(3, 1);
        let mut boundary = QuotientBoundary::build(&g, 2);
        assert_eq!(boundary.quotient_edges().len(), 1);

        // absorb the pendant: no quotient edge remains
        g.set_block(3, 0);
        boundary.post_moved_updates(&g, 3, 1, 0);
        boundary.apply_move_aggregates(1, 1, 0);
        assert!(boundary.quotient_edges().is_empty());
        assert!(boundary.is_consistent_with(&g, 2));
    }

    #[test]
    fn multiblock_membership_updates() {
        // star: center 0, leaves 1,2,3 in blocks 1,2,3; center in block 0
        let mut b = GraphBuilder::new(4, 6);
        b.new_node(1);
        for leaf in 1..4u32 {
            b.new_edge(leaf, 1).unwrap();
        }
        for leaf in 1..4u32 {
            b.new_node(1);
            b.new_edge(0, 1).unwrap();
        }
        let g = b.finish().unwrap();
        g.set_block(0, 0);
        for leaf in 1..4 {
            g.set_block(leaf, leaf);
        }
        let mut boundary = QuotientBoundary::build(&g, 4);
        assert_eq!(boundary.quotient_edges().len(), 3);

        // center joins block 1: pair (0,*) disappears, pairs (1,2) and (1,3) appear
        g.set_block(0, 1);
        boundary.post_moved_updates(&g, 0, 0, 1);
        boundary.apply_move_aggregates(1, 0, 1);
        let pairs: Vec<_> = boundary.quotient_edges().iter().map(|&(p, _)| p).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3)]);
        assert!(boundary.is_consistent_with(&g, 4));
    }
}
