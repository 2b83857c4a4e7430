//! Balance-checked moves against the shared graph and boundary.
//!
//! These are the only mutations the refiners perform on shared state. A move
//! is refused when the destination would meet or exceed the block weight
//! bound or the source block would empty out; a refusal mutates nothing.
//! Both functions keep the boundary index and the per-block aggregates in
//! lockstep with the labels.

use crate::config::PartitionConfig;
use crate::graph::{BlockId, CsrGraph, NodeId};
use crate::refinement::boundary::QuotientBoundary;

/// Move `node` from `from` to `to` if balance allows; returns whether the
/// move happened.
pub fn try_move_node(
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    config: &PartitionConfig,
    node: NodeId,
    from: BlockId,
    to: BlockId,
) -> bool {
    debug_assert_eq!(graph.block(node), from);
    let weight = graph.node_weight(node);

    if boundary.block_weight(to) + weight >= config.upper_bound_partition {
        return false;
    }
    if boundary.block_no_nodes(from) == 1 {
        return false;
    }

    graph.set_block(node, to);
    boundary.post_moved_updates(graph, node, from, to);
    boundary.apply_move_aggregates(weight, from, to);
    true
}

/// Undo a move previously made by [`try_move_node`]; never refused.
pub fn move_node_back(
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    node: NodeId,
    from: BlockId,
    to: BlockId,
) {
    debug_assert_eq!(graph.block(node), to);
    graph.set_block(node, from);
    boundary.post_moved_updates(graph, node, to, from);
    boundary.apply_move_aggregates(graph.node_weight(node), to, from);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn split_path4() -> (CsrGraph, QuotientBoundary, PartitionConfig) {
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
        let boundary = QuotientBoundary::build(&g, 2);
        let mut cfg = PartitionConfig {
            k: 2,
            imbalance: 100.0,
            ..Default::default()
        };
        cfg.configure_balance(&g);
        (g, boundary, cfg)
    }

    #[test]
    fn rejected_move_leaves_state_untouched() {
        let (g, mut boundary, mut cfg) = split_path4();
        cfg.upper_bound_partition = 2; // both blocks already full
        let before = g.export_partition();
        let cut_before = boundary.edge_cut(0, 1);

        assert!(!try_move_node(&g, &mut boundary, &cfg, 1, 0, 1));
        assert_eq!(g.export_partition(), before);
        assert_eq!(boundary.edge_cut(0, 1), cut_before);
        assert_eq!(boundary.block_weight(0), 2);
    }

    #[test]
    fn move_and_back_round_trip() {
        let (g, mut boundary, cfg) = split_path4();
        let before = g.export_partition();

        assert!(try_move_node(&g, &mut boundary, &cfg, 1, 0, 1));
        assert_eq!(g.block(1), 1);
        move_node_back(&g, &mut boundary, 1, 0, 1);
        assert_eq!(g.export_partition(), before);
        assert!(boundary.is_consistent_with(&g, 2));
    }

    #[test]
    fn emptying_a_block_is_refused() {
        let (g, mut boundary, cfg) = split_path4();
        assert!(try_move_node(&g, &mut boundary, &cfg, 1, 0, 1));
        // block 0 now only holds node 0
        assert!(!try_move_node(&g, &mut boundary, &cfg, 0, 0, 1));
    }
}
