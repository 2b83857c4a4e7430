//! Coarsening: clustering plus contraction, level by level.

pub mod clustering;
pub mod contraction;

use log::debug;
use rand::rngs::SmallRng;
use rayon::ThreadPool;

use crate::config::PartitionConfig;
use crate::error::PartitionError;
use crate::graph::{CsrGraph, NodeId, NodeWeight};

/// One coarse level: the contracted graph and the cluster map projecting the
/// next finer level's vertices onto it.
#[derive(Debug)]
pub struct CoarseLevel {
    pub graph: CsrGraph,
    pub cluster: Vec<NodeId>,
}

/// Contraction stops once the graph has at most this many vertices.
fn coarse_target(config: &PartitionConfig) -> usize {
    config.coarse_size_factor * config.k as usize
}

/// Build the coarsening hierarchy above `graph`.
///
/// Levels come back finest-first; uncoarsening consumes them back-to-front so
/// graphs are dropped in LIFO order. The hierarchy is empty when the input is
/// already at or below the coarsening target, or when clustering stops
/// shrinking the graph (shrink factor above 0.95).
pub fn coarsen(
    graph: &CsrGraph,
    config: &PartitionConfig,
    pool: &ThreadPool,
    rng: &mut SmallRng,
) -> Result<Vec<CoarseLevel>, PartitionError> {
    let target = coarse_target(config);
    let max_cluster_weight = cluster_weight_bound(config);

    let mut levels: Vec<CoarseLevel> = Vec::new();

    loop {
        let current: &CsrGraph = levels.last().map(|l| &l.graph).unwrap_or(graph);
        let n = current.n();
        if n <= target {
            break;
        }

        let (cluster, n_coarse) =
            clustering::label_propagation(current, max_cluster_weight, config.lp_rounds, rng);
        if n_coarse as f64 > 0.95 * n as f64 {
            debug!("coarsening stalled at {n} nodes ({n_coarse} clusters)");
            break;
        }

        let coarse = if config.num_threads > 1 && !config.force_sequential_contraction {
            contraction::contract_clustering_parallel(
                current,
                &cluster,
                n_coarse,
                pool,
                config.num_threads,
            )?
        } else {
            contraction::contract_clustering(current, &cluster, n_coarse)?
        };
        debug_assert_eq!(coarse.total_node_weight(), current.total_node_weight());
        debug!("coarsened {} -> {} nodes, {} arcs", n, coarse.n(), coarse.m());

        levels.push(CoarseLevel {
            graph: coarse,
            cluster,
        });
    }

    Ok(levels)
}

/// Cluster weight cap: keeps coarse vertices far below the block bound so the
/// coarsest graph still admits a balanced partition.
fn cluster_weight_bound(config: &PartitionConfig) -> NodeWeight {
    let target = coarse_target(config).max(1) as NodeWeight;
    (config.total_graph_weight / target).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::parallel::build_seeded_pool;
    use crate::rng::worker_rng;

    fn ring(n: usize) -> CsrGraph {
        let mut b = GraphBuilder::new(n, 2 * n);
        for v in 0..n {
            b.new_node(1);
            b.new_edge(((v + n - 1) % n) as NodeId, 1).unwrap();
            b.new_edge(((v + 1) % n) as NodeId, 1).unwrap();
        }
        b.finish().unwrap()
    }

    #[test]
    fn hierarchy_preserves_total_weight() {
        let g = ring(600);
        let mut cfg = PartitionConfig {
            k: 2,
            coarse_size_factor: 30,
            ..Default::default()
        };
        cfg.configure_balance(&g);
        let pool = build_seeded_pool(cfg.seed, 1).unwrap();
        let levels = coarsen(&g, &cfg, &pool, &mut worker_rng(cfg.seed, 0)).unwrap();
        assert!(!levels.is_empty());
        for level in &levels {
            assert_eq!(level.graph.total_node_weight(), 600);
        }
        let coarsest = &levels.last().unwrap().graph;
        assert!(coarsest.n() < 600);
    }

    #[test]
    fn small_graph_skips_coarsening() {
        let g = ring(10);
        let mut cfg = PartitionConfig::default();
        cfg.configure_balance(&g);
        let pool = build_seeded_pool(cfg.seed, 1).unwrap();
        let levels = coarsen(&g, &cfg, &pool, &mut worker_rng(cfg.seed, 0)).unwrap();
        assert!(levels.is_empty());
    }
}
