//! Uncoarsening refinement: data structures, engines, and the per-level
//! driver that wires them to the quotient-graph scheduler.

pub mod boundary;
pub mod cycle_balance;
pub mod gain_pq;
pub mod gains;
pub mod label_propagation;
pub mod moves;
pub mod multitry_kway;
pub mod parallel_kway;
pub mod scheduler;
pub mod stop_rule;
pub mod two_way_fm;

use hashbrown::HashMap;
use log::debug;
use rand::rngs::SmallRng;
use rayon::ThreadPool;

use crate::config::{PartitionConfig, SchedulerKind};
use crate::graph::{BlockId, CsrGraph, EdgeWeight};
use crate::rng::BitRng;

use self::boundary::QuotientBoundary;
use self::parallel_kway::ParallelMultitryKway;
use self::scheduler::QuotientScheduler;

/// Refine the current level's partition in place; returns the total cut
/// improvement. Dispatches to label propagation or to the quotient-graph
/// loop with the configured two-way and k-way engines.
pub fn refine_level(
    config: &PartitionConfig,
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    pool: &ThreadPool,
    rng: &mut SmallRng,
    bit: &mut BitRng,
) -> EdgeWeight {
    if config.label_propagation_refinement {
        return if config.parallel_lp {
            label_propagation::refine_parallel(config, graph, pool, rng)
        } else {
            label_propagation::refine(config, graph, rng)
        };
    }
    quotient_graph_refinement(config, graph, boundary, pool, rng, bit)
}

/// The quotient-graph loop: schedule pairs, run two-way FM on each, and —
/// under the ref-kway scheduler — interleave localized k-way refinement,
/// re-activating whatever blocks it touches.
fn quotient_graph_refinement(
    config: &PartitionConfig,
    graph: &CsrGraph,
    boundary: &mut QuotientBoundary,
    pool: &ThreadPool,
    rng: &mut SmallRng,
    bit: &mut BitRng,
) -> EdgeWeight {
    let edges = boundary.quotient_edges();
    if edges.is_empty() {
        return 0;
    }
    let mut scheduler = QuotientScheduler::new(config.scheduler, &edges, config.bank_account_factor);
    let interleave_kway = config.scheduler == SchedulerKind::ActiveBlocksRefKway;

    let mut parallel_refiner = (interleave_kway && config.parallel_multitry_kway)
        .then(|| ParallelMultitryKway::new(config, graph));

    let mut overall: EdgeWeight = 0;

    // a global k-way sweep first, so pairwise work starts from a settled state
    if interleave_kway {
        let kway = if let Some(refiner) = parallel_refiner.as_mut() {
            refiner.perform_refinement(
                config,
                graph,
                boundary,
                pool,
                config.global_multitry_rounds,
                rng,
                None,
            )
        } else {
            multitry_kway::perform_refinement(
                config,
                graph,
                boundary,
                config.global_multitry_rounds,
                rng,
                bit,
                None,
            )
        };
        debug!("global multitry sweep improved by {kway}");
        overall += kway;
    }

    while let Some((lhs, rhs)) = scheduler.next_pair(boundary) {
        let initial_cut = boundary.edge_cut(lhs, rhs);
        if initial_cut <= 0 {
            // the pair vanished since it was scheduled
            scheduler.push_statistics((lhs, rhs), 0, false);
            continue;
        }

        let mut improvement: EdgeWeight = 0;
        if config.quotient_graph_two_way_refinement {
            improvement = two_way_fm::refine_pair(config, graph, boundary, lhs, rhs, bit);
            overall += improvement;
        }
        let something_changed = improvement != 0;

        if interleave_kway {
            let mut touched: HashMap<BlockId, BlockId> = HashMap::new();
            let kway_improvement = if let Some(refiner) = parallel_refiner.as_mut() {
                refiner.perform_refinement_around_parts(
                    config,
                    graph,
                    boundary,
                    pool,
                    lhs,
                    rhs,
                    rng,
                    Some(&mut touched),
                )
            } else {
                multitry_kway::perform_refinement_around_parts(
                    config,
                    graph,
                    boundary,
                    lhs,
                    rhs,
                    rng,
                    bit,
                    Some(&mut touched),
                )
            };
            overall += kway_improvement;
            if kway_improvement > 0 {
                scheduler.activate_blocks(&touched);
            }
        }

        scheduler.push_statistics((lhs, rhs), improvement, something_changed);

        debug_assert!(boundary.block_no_nodes(lhs) > 0);
        debug_assert!(boundary.block_no_nodes(rhs) > 0);
    }

    overall
}
