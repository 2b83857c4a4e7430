//! Sequential multi-try k-way FM.
//!
//! Repeated localized FM rounds: each round seeds a gain queue with a random
//! permutation of the current boundary (optionally restricted to two
//! blocks), speculatively moves highest-gain vertices on the live graph
//! under the balance bound, and finally unrolls everything past the best
//! seen total gain. Rounds repeat until one fails to improve the cut.

use hashbrown::{HashMap, HashSet};
use rand::rngs::SmallRng;

use crate::config::PartitionConfig;
use crate::graph::{BlockId, CsrGraph, EdgeWeight, Gain, NodeId, INVALID_BLOCK};
use crate::refinement::boundary::QuotientBoundary;
use crate::refinement::gain_pq::GainQueue;
use crate::refinement::gains::compute_gain;
use crate::refinement::moves::{move_node_back, try_move_node};
use crate::refinement::stop_rule::StopRule;
use crate::rng::{permute, BitRng};

/// Refine the whole partition; returns the total cut improvement.
pub fn perform_refinement(
    config: &PartitionConfig,
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    rounds: usize,
    rng: &mut SmallRng,
    bit: &mut BitRng,
    mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
) -> EdgeWeight {
    let mut total = 0;
    for _ in 0..rounds {
        let mut seeds = boundary.all_boundary_nodes();
        if seeds.is_empty() {
            break;
        }
        permute(&mut seeds, rng);
        let improvement = localized_pass(
            config,
            graph,
            boundary,
            &seeds,
            bit,
            touched_blocks.as_deref_mut(),
        );
        total += improvement;
        if improvement == 0 {
            break;
        }
    }
    total
}

/// Refine locally around two blocks, as scheduled by the quotient driver.
pub fn perform_refinement_around_parts(
    config: &PartitionConfig,
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    lhs: BlockId,
    rhs: BlockId,
    rng: &mut SmallRng,
    bit: &mut BitRng,
    mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
) -> EdgeWeight {
    let mut total = 0;
    for _ in 0..config.global_multitry_rounds {
        let mut seeds = boundary.boundary_nodes_of_blocks(lhs, rhs);
        if seeds.is_empty() {
            break;
        }
        permute(&mut seeds, rng);
        let improvement = localized_pass(
            config,
            graph,
            boundary,
            &seeds,
            bit,
            touched_blocks.as_deref_mut(),
        );
        total += improvement;
        if improvement == 0 {
            break;
        }
    }
    total
}

/// One localized FM round over the given seeds; returns the kept gain.
pub(crate) fn localized_pass(
    config: &PartitionConfig,
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    seeds: &[NodeId],
    bit: &mut BitRng,
    touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
) -> EdgeWeight {
    let span = (graph.max_degree() as Gain) * graph.max_edge_weight().max(1);
    let mut queue = GainQueue::new(config.use_bucket_queues, span);
    let mut moved: HashSet<NodeId> = HashSet::new();

    let fits = |boundary: &QuotientBoundary, weight, b: BlockId| {
        boundary.block_weight(b) + weight < config.upper_bound_partition
    };

    for &v in seeds {
        if moved.contains(&v) {
            continue;
        }
        let w = graph.node_weight(v);
        let info = compute_gain(graph, v, graph.block(v), |u| graph.block(u), |b| {
            fits(boundary, w, b)
        });
        if info.target != INVALID_BLOCK {
            queue.insert(v, info.gain);
            moved.insert(v);
        }
    }
    if queue.is_empty() {
        return 0;
    }

    let max_moves = config.max_number_of_moves.unwrap_or(graph.n());
    let step_limit = ((config.kway_adaptive_limits_alpha * seeds.len() as f64) as usize)
        .clamp(15, graph.n().max(15));
    let mut stop_rule = StopRule::new(config, graph.n(), step_limit);

    let mut log: Vec<(NodeId, BlockId, BlockId, Gain)> = Vec::new();
    let mut current_gain: Gain = 0;
    let mut best_gain: Gain = 0;
    let mut best_index = 0usize;
    let mut movements = 0usize;

    while movements < max_moves {
        if queue.is_empty() {
            break;
        }
        if stop_rule.should_stop(log.len() - best_index) {
            break;
        }
        movements += 1;

        let Some((v, _)) = queue.pop_max() else {
            break;
        };
        let from = graph.block(v);
        let w = graph.node_weight(v);
        let info = compute_gain(graph, v, from, |u| graph.block(u), |b| fits(boundary, w, b));
        if info.target == INVALID_BLOCK {
            continue;
        }
        if !try_move_node(graph, boundary, config, v, from, info.target) {
            continue;
        }

        log.push((v, from, info.target, info.gain));
        current_gain += info.gain;
        stop_rule.push_statistics(info.gain);
        if current_gain > best_gain || (current_gain == best_gain && bit.bit()) {
            if current_gain > best_gain {
                stop_rule.reset_statistics();
            }
            best_gain = current_gain;
            best_index = log.len();
        }

        // neighbour gain maintenance, exactly as single-source FM
        for (u, _) in graph.adjacent(v) {
            let uw = graph.node_weight(u);
            let info = compute_gain(graph, u, graph.block(u), |x| graph.block(x), |b| {
                fits(boundary, uw, b)
            });
            if queue.contains(u) {
                if info.target != INVALID_BLOCK {
                    queue.change_key(u, info.gain);
                } else {
                    queue.delete(u);
                }
            } else if info.target != INVALID_BLOCK && !moved.contains(&u) {
                queue.insert(u, info.gain);
                moved.insert(u);
            }
        }
    }

    // unroll everything past the best seen prefix
    while log.len() > best_index {
        let (v, from, to, _) = log.pop().expect("length checked");
        move_node_back(graph, boundary, v, from, to);
    }

    if let Some(touched) = touched_blocks {
        for &(_, from, to, _) in &log {
            touched.insert(from, from);
            touched.insert(to, to);
        }
    }
    debug_assert!(boundary.is_consistent_with(graph, config.k));

    best_gain
}
