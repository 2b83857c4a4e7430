//! Two-way FM refinement across a single quotient edge.
//!
//! Classical Fiduccia-Mattheyses with one gain queue per side, seeded from
//! the pair's directed boundaries. Moves are applied live on the shared
//! graph and boundary; after the search stops, everything past the best seen
//! state is rolled back. The driver runs up to three passes on a pair: the
//! plain pass, then — while exactly one of the two blocks is overloaded — a
//! soft-rebalance pass that admits balance-improving zero/negative moves and
//! a hard-rebalance pass that chases balance before cut.

use hashbrown::HashSet;

use crate::config::PartitionConfig;
use crate::graph::{BlockId, CsrGraph, EdgeWeight, Gain, NodeId};
use crate::refinement::boundary::QuotientBoundary;
use crate::refinement::gain_pq::GainQueue;
use crate::refinement::gains::gain_to_block;
use crate::rng::BitRng;

/// Contract for a flow-based two-way engine that can be plugged in next to
/// FM: given a pair and its boundaries, improve the cut without breaking the
/// balance bound, and report the achieved improvement. No implementation
/// ships in this build; [`crate::config::RefinementType`] rejects the flow
/// variants at validation.
pub trait TwoWayFlowRefiner {
    fn refine_pair(
        &mut self,
        config: &PartitionConfig,
        graph: &CsrGraph,
        boundary: &mut QuotientBoundary,
        lhs: BlockId,
        rhs: BlockId,
    ) -> EdgeWeight;
}

/// Refine one quotient edge; returns the total cut improvement (negative
/// only when a rebalance pass traded cut for balance).
pub fn refine_pair(
    config: &PartitionConfig,
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    lhs: BlockId,
    rhs: BlockId,
    rng: &mut BitRng,
) -> EdgeWeight {
    let mut improvement = fm_pass(config, graph, boundary, lhs, rhs, rng, Mode::Plain);

    if exactly_one_overloaded(config, boundary, lhs, rhs) {
        improvement += fm_pass(config, graph, boundary, lhs, rhs, rng, Mode::Soft);

        if exactly_one_overloaded(config, boundary, lhs, rhs) {
            improvement += fm_pass(config, graph, boundary, lhs, rhs, rng, Mode::Hard);
        }
    }

    improvement
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    /// Admit balance-improving moves regardless of gain.
    Soft,
    /// Drain the overloaded side until the bound holds.
    Hard,
}

fn exactly_one_overloaded(
    config: &PartitionConfig,
    boundary: &QuotientBoundary,
    lhs: BlockId,
    rhs: BlockId,
) -> bool {
    let over_l = boundary.block_weight(lhs) > config.upper_bound_partition;
    let over_r = boundary.block_weight(rhs) > config.upper_bound_partition;
    over_l != over_r
}

struct BestState {
    balanced: bool,
    cut: EdgeWeight,
    /// Number of moves kept.
    index: usize,
}

fn fm_pass(
    config: &PartitionConfig,
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    lhs: BlockId,
    rhs: BlockId,
    rng: &mut BitRng,
    mode: Mode,
) -> EdgeWeight {
    let sides = [lhs, rhs];
    let two_way_gain = |g: &CsrGraph, v: NodeId, from: BlockId, to: BlockId| -> (Gain, EdgeWeight) {
        let gain = gain_to_block(g, v, from, to, |u| g.block(u));
        let ext: EdgeWeight = g
            .adjacent(v)
            .filter(|&(u, _)| g.block(u) == to)
            .map(|(_, w)| w)
            .sum();
        (gain, ext)
    };

    let span = (graph.max_degree() as Gain) * graph.max_edge_weight().max(1);
    let mut queues = [
        GainQueue::new(config.use_bucket_queues, span),
        GainQueue::new(config.use_bucket_queues, span),
    ];
    let mut seeded = 0usize;
    for side in 0..2 {
        let own = sides[side];
        let other = sides[1 - side];
        if let Some(nodes) = boundary.directed_boundary(own, other) {
            // fixed seeding order keeps fixed-seed runs reproducible
            let mut nodes: Vec<NodeId> = nodes.iter().copied().collect();
            nodes.sort_unstable();
            for v in nodes {
                let (gain, _) = two_way_gain(graph, v, own, other);
                queues[side].insert(v, gain);
                seeded += 1;
            }
        }
    }
    if seeded == 0 {
        return 0;
    }

    let limit = ((seeded as f64 * 0.05) as usize).clamp(15, 100);
    let balanced_now = |b: &QuotientBoundary| {
        b.block_weight(lhs) <= config.upper_bound_partition
            && b.block_weight(rhs) <= config.upper_bound_partition
    };

    let initial_cut = boundary.edge_cut(lhs, rhs);
    let mut cut = initial_cut;
    let mut best = BestState {
        balanced: balanced_now(boundary),
        cut,
        index: 0,
    };

    let mut moved: HashSet<NodeId> = HashSet::new();
    let mut log: Vec<(NodeId, BlockId, BlockId)> = Vec::new();

    loop {
        if queues[0].is_empty() && queues[1].is_empty() {
            break;
        }
        if log.len() >= best.index + limit && mode != Mode::Hard {
            break;
        }
        if mode == Mode::Hard && balanced_now(boundary) {
            break;
        }

        // pick the side to move away from
        let side = match (queues[0].max_gain(), queues[1].max_gain()) {
            (Some(_), None) => 0,
            (None, Some(_)) => 1,
            (Some(a), Some(b)) => {
                if mode != Mode::Plain {
                    // rebalance: prefer draining the overloaded block
                    let over0 = boundary.block_weight(lhs) > config.upper_bound_partition;
                    let over1 = boundary.block_weight(rhs) > config.upper_bound_partition;
                    match (over0, over1) {
                        (true, false) => 0,
                        (false, true) => 1,
                        _ => usize::from(b > a || (a == b && rng.bit())),
                    }
                } else if a > b || (a == b && rng.bit()) {
                    0
                } else {
                    1
                }
            }
            (None, None) => break,
        };

        let from = sides[side];
        let to = sides[1 - side];
        let Some((v, _)) = queues[side].pop_max() else {
            continue;
        };
        let weight = graph.node_weight(v);
        let (gain, _) = two_way_gain(graph, v, from, to);

        let fits = boundary.block_weight(to) + weight <= config.upper_bound_partition;
        let improves_balance = boundary.block_weight(from) > config.upper_bound_partition
            && boundary.block_weight(to) + weight < boundary.block_weight(from);
        let feasible = match mode {
            Mode::Plain => fits,
            Mode::Soft | Mode::Hard => fits || improves_balance,
        };
        if !feasible || boundary.block_no_nodes(from) == 1 {
            continue;
        }

        graph.set_block(v, to);
        boundary.post_moved_updates(graph, v, from, to);
        boundary.apply_move_aggregates(weight, from, to);
        moved.insert(v);
        log.push((v, from, to));
        cut -= gain;

        let balanced = balanced_now(boundary);
        let better = (balanced && !best.balanced)
            || (balanced == best.balanced && (cut < best.cut || (cut == best.cut && rng.bit())));
        if better {
            best = BestState {
                balanced,
                cut,
                index: log.len(),
            };
        }

        // refresh the pair-local gains of the neighbours
        for (u, _) in graph.adjacent(v) {
            let bu = graph.block(u);
            if moved.contains(&u) || (bu != lhs && bu != rhs) {
                continue;
            }
            let u_side = usize::from(bu == rhs);
            let (u_gain, u_ext) = two_way_gain(graph, u, bu, sides[1 - u_side]);
            if queues[u_side].contains(u) {
                if u_ext > 0 {
                    queues[u_side].change_key(u, u_gain);
                } else {
                    queues[u_side].delete(u);
                }
            } else if u_ext > 0 {
                queues[u_side].insert(u, u_gain);
            }
        }
    }

    // roll back past the best seen state
    while log.len() > best.index {
        let (v, from, to) = log.pop().expect("log length checked above");
        graph.set_block(v, from);
        boundary.post_moved_updates(graph, v, to, from);
        boundary.apply_move_aggregates(graph.node_weight(v), to, from);
    }
    debug_assert!(boundary.is_consistent_with(graph, config.k));

    initial_cut - best.cut
}
