//! Parallel multi-try k-way FM.
//!
//! Each phase hands every worker a disjoint slice of the boundary as seeds,
//! lets the workers explore speculatively against a frozen view of the
//! shared labels, then joins and applies their transposition logs through a
//! single coordinator (see [`core`]). Phase separation is the whole
//! concurrency story: no shared mutable is written while anyone explores.

pub mod core;
pub mod thread_data;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use hashbrown::HashMap;
use log::debug;
use rand::rngs::SmallRng;
use rayon::ThreadPool;

use crate::config::PartitionConfig;
use crate::graph::{BlockId, CsrGraph, EdgeWeight, Gain, NodeId};
use crate::refinement::boundary::QuotientBoundary;
use crate::rng::permute;

use self::thread_data::{SharedExplore, ThreadData};

/// Reusable parallel refiner; owns the per-worker state across phases.
pub struct ParallelMultitryKway {
    threads_data: Vec<ThreadData>,
    moved_idx: Vec<AtomicBool>,
    reactivated: Vec<NodeId>,
}

impl ParallelMultitryKway {
    pub fn new(config: &PartitionConfig, graph: &CsrGraph) -> Self {
        let span = (graph.max_degree() as Gain) * graph.max_edge_weight().max(1);
        let threads_data = (0..config.num_threads)
            .map(|id| ThreadData::new(id, config, span))
            .collect();
        let moved_idx = (0..graph.n()).map(|_| AtomicBool::new(false)).collect();
        Self {
            threads_data,
            moved_idx,
            reactivated: Vec::new(),
        }
    }

    /// Refine the whole partition for up to `rounds` phases.
    pub fn perform_refinement(
        &mut self,
        config: &PartitionConfig,
        graph: &CsrGraph,
        boundary: &mut QuotientBoundary,
        pool: &ThreadPool,
        rounds: usize,
        rng: &mut SmallRng,
        mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
    ) -> EdgeWeight {
        let mut total = 0;
        for _ in 0..rounds {
            let seeds = boundary.all_boundary_nodes();
            let gain = self.one_phase(
                config,
                graph,
                boundary,
                pool,
                seeds,
                rng,
                touched_blocks.as_deref_mut(),
            );
            total += gain;
            if gain == 0 {
                break;
            }
        }
        total
    }

    /// Refine locally around two blocks, as scheduled by the quotient driver.
    #[allow(clippy::too_many_arguments)]
    pub fn perform_refinement_around_parts(
        &mut self,
        config: &PartitionConfig,
        graph: &CsrGraph,
        boundary: &mut QuotientBoundary,
        pool: &ThreadPool,
        lhs: BlockId,
        rhs: BlockId,
        rng: &mut SmallRng,
        mut touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
    ) -> EdgeWeight {
        let mut total = 0;
        for _ in 0..config.global_multitry_rounds {
            let seeds = boundary.boundary_nodes_of_blocks(lhs, rhs);
            let gain = self.one_phase(
                config,
                graph,
                boundary,
                pool,
                seeds,
                rng,
                touched_blocks.as_deref_mut(),
            );
            total += gain;
            if gain == 0 {
                break;
            }
        }
        total
    }

    /// One explore-barrier-apply phase over the given seeds.
    #[allow(clippy::too_many_arguments)]
    fn one_phase(
        &mut self,
        config: &PartitionConfig,
        graph: &CsrGraph,
        boundary: &mut QuotientBoundary,
        pool: &ThreadPool,
        mut seeds: Vec<NodeId>,
        rng: &mut SmallRng,
        touched_blocks: Option<&mut HashMap<BlockId, BlockId>>,
    ) -> EdgeWeight {
        // fold in vertices a reactive conflict policy flagged last phase
        if !self.reactivated.is_empty() {
            seeds.append(&mut self.reactivated);
            seeds.sort_unstable();
            seeds.dedup();
        }
        if seeds.is_empty() {
            return 0;
        }
        permute(&mut seeds, rng);

        let num_threads = self.threads_data.len();
        let step_limit = ((config.kway_adaptive_limits_alpha * seeds.len() as f64) as usize)
            .clamp(15, graph.n().max(15));
        let chunk = seeds.len().div_ceil(num_threads);
        for (i, td) in self.threads_data.iter_mut().enumerate() {
            td.sync_aggregates(boundary, config.k);
            td.step_limit = step_limit;
            td.start_nodes.clear();
            td.start_nodes
                .extend(seeds.iter().skip(i * chunk).take(chunk));
        }

        // exploration: workers only read the shared labels
        let num_threads_finished = AtomicU32::new(0);
        let shared = SharedExplore {
            graph,
            config,
            moved_idx: &self.moved_idx,
            num_threads_finished: &num_threads_finished,
        };
        pool.in_place_scope(|scope| {
            for td in self.threads_data.iter_mut() {
                let shared = &shared;
                scope.spawn(move |_| {
                    core::explore_round(shared, td);
                    shared.num_threads_finished.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        // serialized commit by the coordinator
        let (gain, moved) = core::apply_moves(
            graph,
            config,
            boundary,
            &mut self.threads_data,
            &mut self.reactivated,
            touched_blocks,
        );
        debug!("parallel kway phase: gain {gain}, {moved} nodes committed");

        // release claim bits and drop the logs
        for td in self.threads_data.iter_mut() {
            for &v in &td.claimed {
                self.moved_idx[v as usize].store(false, Ordering::Relaxed);
            }
            td.reset_phase();
        }
        debug_assert!(boundary.is_consistent_with(graph, config.k));

        gain
    }
}
