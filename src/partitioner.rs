//! The multilevel driver: coarsen, partition the coarsest level, then
//! uncoarsen with per-level projection and refinement.

use log::{debug, info};

use crate::coarsening::{self, CoarseLevel};
use crate::config::PartitionConfig;
use crate::error::PartitionError;
use crate::graph::{CsrGraph, NodeId};
use crate::initial;
use crate::metrics;
use crate::parallel::build_seeded_pool;
use crate::refinement::{self, boundary::QuotientBoundary};
use crate::rng::{worker_rng, BitRng};

/// Partition `graph` in place according to `config`; returns the final cut.
///
/// With `only_first_level` (the input-partition mode) the hierarchy is
/// skipped entirely and the partition already on the graph is refined on the
/// input level. Otherwise the full recipe runs: cluster-contract down to the
/// coarsening target, greedy growing at the coarsest level, and per-level
/// projection plus refinement on the way back up.
pub fn perform_partitioning(
    config: &PartitionConfig,
    graph: &mut CsrGraph,
) -> Result<i64, PartitionError> {
    if graph.n() < config.k as usize {
        return Err(PartitionError::InvalidArguments(format!(
            "cannot split {} vertices into {} blocks",
            graph.n(),
            config.k
        )));
    }
    graph.set_block_count(config.k);
    let pool = build_seeded_pool(config.seed, config.num_threads)?;
    let mut rng = worker_rng(config.seed, config.num_threads);
    let mut bit = BitRng::new(config.seed ^ 0x5bd1_e995);

    if config.only_first_level || config.graph_already_partitioned {
        let mut boundary = QuotientBoundary::build(graph, config.k);
        let improvement =
            refinement::refine_level(config, graph, &mut boundary, &pool, &mut rng, &mut bit);
        debug!("input-partition refinement improved by {improvement}");
        return Ok(metrics::edge_cut(graph));
    }

    let mut levels: Vec<CoarseLevel> = coarsening::coarsen(graph, config, &pool, &mut rng)?;
    info!(
        "hierarchy of {} level(s) above the input graph",
        levels.len()
    );

    // initial partition on the coarsest level
    {
        let coarsest: &mut CsrGraph = levels
            .last_mut()
            .map(|l| &mut l.graph)
            .unwrap_or(&mut *graph);
        coarsest.set_block_count(config.k);
        initial::initial_partition(config, coarsest, &mut rng);
        let mut boundary = QuotientBoundary::build(coarsest, config.k);
        refinement::refine_level(config, coarsest, &mut boundary, &pool, &mut rng, &mut bit);
        debug!(
            "coarsest level partitioned, cut {}",
            metrics::edge_cut(coarsest)
        );
    }

    // uncoarsen: project each level's labels onto the next finer graph and
    // refine there; levels drop in LIFO order
    while let Some(level) = levels.pop() {
        let finer: &mut CsrGraph = levels
            .last_mut()
            .map(|l| &mut l.graph)
            .unwrap_or(&mut *graph);
        project_partition(finer, &level.graph, &level.cluster);
        finer.set_block_count(config.k);
        drop(level);

        let mut boundary = QuotientBoundary::build(finer, config.k);
        let improvement =
            refinement::refine_level(config, finer, &mut boundary, &pool, &mut rng, &mut bit);
        debug!(
            "level with {} nodes refined by {improvement}, cut now {}",
            finer.n(),
            metrics::edge_cut(finer)
        );
    }

    Ok(metrics::edge_cut(graph))
}

/// Pull the coarse labels down through the cluster map.
fn project_partition(finer: &CsrGraph, coarse: &CsrGraph, cluster: &[NodeId]) {
    debug_assert_eq!(cluster.len(), finer.n());
    for v in 0..finer.n() as NodeId {
        finer.set_block(v, coarse.block(cluster[v as usize]));
    }
}
