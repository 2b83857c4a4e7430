//! Exploration rounds and the serialized apply phase.
//!
//! Workers explore speculatively: every move touches only the worker's
//! shadow labels and aggregate copies, and is recorded in its transposition
//! log. After the barrier, one coordinator walks the logs in worker-id
//! order, revalidates each move against the shared graph, commits it with
//! [`try_move_node`], and routes disagreements through the configured
//! conflict policy. The shared cut after apply has decreased by exactly the
//! sum of committed gains.

use std::sync::atomic::Ordering;

use hashbrown::{HashMap, HashSet};

use crate::config::{ApplyMoveStrategy, PartitionConfig};
use crate::graph::{BlockId, CsrGraph, EdgeWeight, Gain, NodeId, INVALID_BLOCK};
use crate::refinement::boundary::QuotientBoundary;
use crate::refinement::gain_pq::GainQueue;
use crate::refinement::gains::compute_gain;
use crate::refinement::moves::{move_node_back, try_move_node};
use crate::refinement::stop_rule::StopRule;
use crate::rng::BitRng;

use super::thread_data::{RoundLog, SharedExplore, ThreadData};

/// Owner id marking nodes moved by a conflict policy: every worker treats
/// them as moved-by-another.
const CONFLICT_OWNER: usize = usize::MAX;

/// Nodes committed this apply phase: node -> (owner worker, block it left).
type MovedNodes = HashMap<NodeId, (usize, BlockId)>;

fn is_moved(moved_nodes: &MovedNodes, node: NodeId, worker: usize) -> bool {
    moved_nodes
        .get(&node)
        .is_some_and(|&(owner, _)| owner != worker)
}

/// Run one speculative FM round over `td.start_nodes`. Returns the round's
/// best local gain; the shared graph and boundary are not touched.
pub fn explore_round(shared: &SharedExplore<'_>, td: &mut ThreadData) -> Gain {
    let graph = shared.graph;
    let config = shared.config;
    td.queue.clear();

    // claim and enqueue the seeds
    for i in 0..td.start_nodes.len() {
        let node = td.start_nodes[i];
        if shared.moved_idx[node as usize]
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            continue;
        }
        td.claimed.push(node);
        let from = td.local_block(graph, node);
        let info = local_gain(graph, td, node, from, config);
        if info.0 != INVALID_BLOCK {
            td.queue.insert(node, info.1);
        }
    }

    if td.queue.is_empty() {
        td.rounds.push(RoundLog {
            start: td.transpositions.len(),
            end: td.transpositions.len(),
            min_cut_index: None,
        });
        return 0;
    }

    let start = td.transpositions.len();
    let max_moves = config.max_number_of_moves.unwrap_or(graph.n());
    let mut stop_rule = StopRule::new(config, graph.n(), td.step_limit);

    let mut current_gain: Gain = 0;
    let mut best_gain: Gain = 0;
    let mut min_cut_index: Option<usize> = None;
    let mut movements = 0usize;

    while movements < max_moves {
        if td.queue.is_empty() {
            td.stop_empty_queue += 1;
            break;
        }
        if shared.num_threads_finished.load(Ordering::Relaxed) > 0 {
            td.stop_peer_finished += 1;
            break;
        }
        let steps_since_best = td.transpositions.len()
            - min_cut_index.map(|i| i + 1).unwrap_or(start).max(start);
        if stop_rule.should_stop(steps_since_best) {
            td.stop_stopping_rule += 1;
            break;
        }
        movements += 1;

        let Some((node, _)) = td.queue.pop_max() else {
            break;
        };
        let from = td.local_block(graph, node);
        let (to, gain) = local_gain(graph, td, node, from, config);
        if to == INVALID_BLOCK {
            continue;
        }
        let weight = graph.node_weight(node);
        if td.parts_sizes[from as usize] == 1
            || td.parts_weights[to as usize] + weight >= config.upper_bound_partition
        {
            continue;
        }

        // speculative move: shadow labels and local aggregates only
        td.set_local_block(node, to);
        td.parts_weights[from as usize] -= weight;
        td.parts_weights[to as usize] += weight;
        td.parts_sizes[from as usize] -= 1;
        td.parts_sizes[to as usize] += 1;
        td.accepted_moves += 1;

        td.transpositions.push(node);
        td.from_blocks.push(from);
        td.to_blocks.push(to);
        td.gains.push(gain);

        current_gain += gain;
        stop_rule.push_statistics(gain);
        if current_gain > best_gain || (current_gain == best_gain && td.bit.bit()) {
            if current_gain > best_gain {
                stop_rule.reset_statistics();
            }
            best_gain = current_gain;
            min_cut_index = Some(td.transpositions.len() - 1);
        }

        // neighbour maintenance against the local view
        for e in graph.edges_of(node) {
            let target = graph.target(e);
            if td.queue.contains(target) {
                let t_from = td.local_block(graph, target);
                let (t_to, t_gain) = local_gain(graph, td, target, t_from, config);
                if t_to != INVALID_BLOCK {
                    td.queue.change_key(target, t_gain);
                } else {
                    td.queue.delete(target);
                }
            } else {
                if shared.moved_idx[target as usize].load(Ordering::Relaxed) {
                    continue;
                }
                let t_from = td.local_block(graph, target);
                let (t_to, t_gain) = local_gain(graph, td, target, t_from, config);
                if t_to != INVALID_BLOCK
                    && shared.moved_idx[target as usize]
                        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                {
                    td.claimed.push(target);
                    td.queue.insert(target, t_gain);
                }
            }
        }
    }
    if movements == max_moves {
        td.stop_max_moves += 1;
    }

    // roll the local aggregates back past the best index; the shared state
    // was never touched, and the log stays for the apply phase
    let keep_past = min_cut_index.map(|i| i + 1).unwrap_or(start);
    for index in (keep_past..td.transpositions.len()).rev() {
        let node = td.transpositions[index];
        let from = td.from_blocks[index];
        let to = td.to_blocks[index];
        let weight = graph.node_weight(node);
        td.parts_weights[from as usize] += weight;
        td.parts_weights[to as usize] -= weight;
        td.parts_sizes[from as usize] += 1;
        td.parts_sizes[to as usize] -= 1;
    }
    td.shadow.clear();

    td.rounds.push(RoundLog {
        start,
        end: td.transpositions.len(),
        min_cut_index,
    });
    best_gain
}

/// Best feasible destination in the worker's local view.
#[inline]
fn local_gain(
    graph: &CsrGraph,
    td: &ThreadData,
    node: NodeId,
    from: BlockId,
    config: &PartitionConfig,
) -> (BlockId, Gain) {
    let weight = graph.node_weight(node);
    let info = compute_gain(
        graph,
        node,
        from,
        |u| td.local_block(graph, u),
        |b| td.parts_weights[b as usize] + weight < config.upper_bound_partition,
    );
    (info.target, info.gain)
}

/// Best feasible destination against the shared graph, preferring the
/// worker's expected destination on equal weight.
fn shared_gain(
    graph: &CsrGraph,
    boundary: &QuotientBoundary,
    config: &PartitionConfig,
    node: NodeId,
    from: BlockId,
    expected_to: BlockId,
) -> (BlockId, Gain) {
    let weight = graph.node_weight(node);
    let mut per_block: HashMap<BlockId, EdgeWeight> = HashMap::new();
    let mut internal: EdgeWeight = 0;
    for (u, w) in graph.adjacent(node) {
        let b = graph.block(u);
        if b == from {
            internal += w;
        } else {
            *per_block.entry(b).or_insert(0) += w;
        }
    }
    let mut target = INVALID_BLOCK;
    let mut best: EdgeWeight = EdgeWeight::MIN;
    for (&b, &w) in &per_block {
        if boundary.block_weight(b) + weight >= config.upper_bound_partition {
            continue;
        }
        let wins = w > best
            || (w == best && b == expected_to)
            || (w == best && target != expected_to && b < target);
        if wins {
            best = w;
            target = b;
        }
    }
    if target == INVALID_BLOCK {
        (target, 0)
    } else {
        (target, best - internal)
    }
}

/// Serialized apply phase: walk every worker's log in worker-id order,
/// commit validated moves, and hand conflicts to the configured policy.
/// Returns the total committed gain and the number of committed nodes.
pub fn apply_moves(
    graph: &CsrGraph,
    config: &PartitionConfig,
    boundary: &mut QuotientBoundary,
    threads_data: &mut [ThreadData],
    reactivated: &mut Vec<NodeId>,
    mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
) -> (EdgeWeight, usize) {
    let mut moved_nodes: MovedNodes = HashMap::new();
    let mut not_moved: HashSet<NodeId> = HashSet::new();
    let mut overall_gain: EdgeWeight = 0;

    for td in threads_data.iter_mut() {
        overall_gain += apply_worker_log(
            graph,
            config,
            boundary,
            td,
            &mut moved_nodes,
            &mut not_moved,
            reactivated,
            touched_blocks.as_deref_mut(),
        );
    }
    (overall_gain, moved_nodes.len())
}

#[allow(clippy::too_many_arguments)]
fn apply_worker_log(
    graph: &CsrGraph,
    config: &PartitionConfig,
    boundary: &mut QuotientBoundary,
    td: &mut ThreadData,
    moved_nodes: &mut MovedNodes,
    not_moved: &mut HashSet<NodeId>,
    reactivated: &mut Vec<NodeId>,
    mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
) -> EdgeWeight {
    let rounds = td.rounds.clone();
    let worker = td.id;
    let mut cut_improvement: EdgeWeight = 0;

    for round in rounds {
        let Some(min_cut_index) = round.min_cut_index else {
            continue;
        };

        // committed-but-uncertain tail since the last best prefix
        let mut tail: Vec<(NodeId, BlockId, Gain)> = Vec::new();
        let mut total_gain: Gain = 0;
        let mut best_total_gain: Gain = 0;
        let mut index = round.start;
        let mut conflicted_at: Option<usize> = None;

        while index <= min_cut_index {
            let node = td.transpositions[index];
            let expected_from = td.from_blocks[index];
            let expected_to = td.to_blocks[index];
            let expected_gain = td.gains[index];

            if is_moved(moved_nodes, node, worker) {
                conflicted_at = Some(index);
                break;
            }

            // a committed-by-another or rejected neighbour invalidates the
            // speculative gain whenever it sits in (or left) either endpoint
            // block of this move
            let mut neighbour_conflict = false;
            for (u, _) in graph.adjacent(node) {
                let u_rejected = not_moved.contains(&u);
                if !u_rejected && !is_moved(moved_nodes, u, worker) {
                    continue;
                }
                let u_block = graph.block(u);
                let u_prev = moved_nodes.get(&u).map(|&(_, p)| p);
                if u_rejected
                    || u_block == expected_to
                    || u_block == expected_from
                    || u_prev == Some(expected_to)
                    || u_prev == Some(expected_from)
                {
                    neighbour_conflict = true;
                    break;
                }
            }
            if neighbour_conflict {
                conflicted_at = Some(index);
                break;
            }

            let actual_from = graph.block(node);
            let (actual_to, actual_gain) =
                shared_gain(graph, boundary, config, node, actual_from, expected_to);
            if actual_to == INVALID_BLOCK {
                index += 1;
                continue;
            }
            let same_move = actual_from == expected_from
                && actual_to == expected_to
                && actual_gain == expected_gain;

            if try_move_node(graph, boundary, config, node, actual_from, actual_to) {
                moved_nodes.insert(node, (worker, actual_from));
                tail.push((node, actual_from, actual_gain));
                cut_improvement += actual_gain;
                total_gain += actual_gain;
                if let Some(touched) = touched_blocks.as_deref_mut() {
                    touched.insert(actual_from, actual_from);
                    touched.insert(actual_to, actual_to);
                }
                if config.apply_move_strategy == ApplyMoveStrategy::ReactiveVertices
                    && config.kway_all_boundary_nodes_refinement
                {
                    reactivated.push(node);
                    reactivated.extend(graph.adjacent(node).map(|(u, _)| u));
                }

                if total_gain > best_total_gain
                    || (total_gain == best_total_gain && (td.bit.bit() || same_move))
                {
                    best_total_gain = total_gain;
                    tail.clear();
                }
                index += 1;
            } else {
                conflicted_at = Some(index);
                break;
            }
        }

        if let Some(first_skipped) = conflicted_at {
            // give up on the round's remainder: unroll the uncertain tail,
            // remember what never made it, then let the policy act
            for &(node, from, gain) in tail.iter().rev() {
                let current = graph.block(node);
                move_node_back(graph, boundary, node, from, current);
                moved_nodes.remove(&node);
                not_moved.insert(node);
                cut_improvement -= gain;
            }
            tail.clear();
            for i in first_skipped..=min_cut_index {
                not_moved.insert(td.transpositions[i]);
            }

            let budget = round.end.saturating_sub(first_skipped);
            let start_node = td.transpositions[first_skipped];
            cut_improvement += match config.apply_move_strategy {
                ApplyMoveStrategy::LocalSearch => local_search_from_node(
                    graph,
                    config,
                    boundary,
                    start_node,
                    budget,
                    &mut td.bit,
                    moved_nodes,
                    touched_blocks.as_deref_mut(),
                ),
                ApplyMoveStrategy::GainRecalculation => gain_recalculation(
                    graph,
                    config,
                    boundary,
                    &td.transpositions[first_skipped..round.end],
                    &mut td.bit,
                    moved_nodes,
                    touched_blocks.as_deref_mut(),
                ),
                ApplyMoveStrategy::ReactiveVertices => {
                    reactivated.push(start_node);
                    reactivated.extend(graph.adjacent(start_node).map(|(u, _)| u));
                    0
                }
                ApplyMoveStrategy::Skip => 0,
            };
        } else {
            // the round applied cleanly up to its best prefix; drop any
            // non-improving committed tail
            for &(node, from, gain) in tail.iter().rev() {
                let current = graph.block(node);
                move_node_back(graph, boundary, node, from, current);
                moved_nodes.remove(&node);
                cut_improvement -= gain;
            }
        }
    }

    cut_improvement
}

/// LOCAL_SEARCH conflict policy: a fresh FM search on the shared state,
/// seeded at the first skipped node, with budget proportional to the
/// remaining transpositions.
#[allow(clippy::too_many_arguments)]
fn local_search_from_node(
    graph: &CsrGraph,
    config: &PartitionConfig,
    boundary: &mut QuotientBoundary,
    start_node: NodeId,
    budget: usize,
    bit: &mut BitRng,
    moved_nodes: &mut MovedNodes,
    mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
) -> EdgeWeight {
    let max_moves = 2 * budget + 100;
    let span = (graph.max_degree() as Gain) * graph.max_edge_weight().max(1);
    let mut queue = GainQueue::new(config.use_bucket_queues, span);
    let mut seen: HashSet<NodeId> = HashSet::new();

    {
        let from = graph.block(start_node);
        let weight = graph.node_weight(start_node);
        let info = compute_gain(
            graph,
            start_node,
            from,
            |u| graph.block(u),
            |b| boundary.block_weight(b) + weight < config.upper_bound_partition,
        );
        if info.ext_degree == 0 {
            return 0;
        }
        if info.target == INVALID_BLOCK {
            return 0;
        }
        queue.insert(start_node, info.gain);
        seen.insert(start_node);
    }

    let mut stop_rule = StopRule::new(config, graph.n(), max_moves);
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

        let Some((node, _)) = queue.pop_max() else {
            break;
        };
        let from = graph.block(node);
        let weight = graph.node_weight(node);
        let info = compute_gain(
            graph,
            node,
            from,
            |u| graph.block(u),
            |b| boundary.block_weight(b) + weight < config.upper_bound_partition,
        );
        if info.target == INVALID_BLOCK {
            continue;
        }
        if !try_move_node(graph, boundary, config, node, from, info.target) {
            continue;
        }

        log.push((node, from, info.target, info.gain));
        current_gain += info.gain;
        stop_rule.push_statistics(info.gain);
        if current_gain > best_gain || (current_gain == best_gain && bit.bit()) {
            if current_gain > best_gain {
                stop_rule.reset_statistics();
            }
            best_gain = current_gain;
            best_index = log.len();
        }

        for (u, _) in graph.adjacent(node) {
            let uw = graph.node_weight(u);
            let u_info = compute_gain(
                graph,
                u,
                graph.block(u),
                |x| graph.block(x),
                |b| boundary.block_weight(b) + uw < config.upper_bound_partition,
            );
            if queue.contains(u) {
                if u_info.target != INVALID_BLOCK {
                    queue.change_key(u, u_info.gain);
                } else {
                    queue.delete(u);
                }
            } else if u_info.target != INVALID_BLOCK && !seen.contains(&u) {
                queue.insert(u, u_info.gain);
                seen.insert(u);
            }
        }
    }

    while log.len() > best_index {
        let (node, from, to, _) = log.pop().expect("length checked");
        move_node_back(graph, boundary, node, from, to);
    }

    // every kept move is visible to all workers as a foreign move
    for &(node, from, to, _) in &log {
        moved_nodes.insert(node, (CONFLICT_OWNER, from));
        if let Some(touched) = touched_blocks.as_deref_mut() {
            touched.insert(from, from);
            touched.insert(to, to);
        }
    }

    best_gain
}

/// GAIN_RECALCULATION conflict policy: walk the remaining transpositions,
/// re-derive each gain from the shared state, keep strictly positive moves,
/// and roll back any non-improving tail.
fn gain_recalculation(
    graph: &CsrGraph,
    config: &PartitionConfig,
    boundary: &mut QuotientBoundary,
    remainder: &[NodeId],
    bit: &mut BitRng,
    moved_nodes: &mut MovedNodes,
    mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
) -> EdgeWeight {
    let mut log: Vec<(NodeId, BlockId, BlockId, Gain)> = Vec::new();
    let mut total_gain: Gain = 0;
    let mut best_total_gain: Gain = 0;
    let mut best_index = 0usize;

    for &node in remainder {
        let from = graph.block(node);
        let (to, gain) = shared_gain(graph, boundary, config, node, from, INVALID_BLOCK);
        if to == INVALID_BLOCK || gain <= 0 {
            continue;
        }
        if !try_move_node(graph, boundary, config, node, from, to) {
            continue;
        }
        log.push((node, from, to, gain));
        total_gain += gain;
        if total_gain > best_total_gain || (total_gain == best_total_gain && bit.bit()) {
            best_total_gain = total_gain;
            best_index = log.len();
        }
    }

    while log.len() > best_index {
        let (node, from, to, _) = log.pop().expect("length checked");
        move_node_back(graph, boundary, node, from, to);
    }
    for &(node, from, to, _) in &log {
        moved_nodes.insert(node, (CONFLICT_OWNER, from));
        if let Some(touched) = touched_blocks.as_deref_mut() {
            touched.insert(from, from);
            touched.insert(to, to);
        }
    }

    best_total_gain
}
