//! Property tests: pipeline invariants on random graphs and conservation
//! laws of the contractor, plus the hierarchy round-trip identity.

mod support;

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use millcut::coarsening::{self, contraction};
use millcut::config::PartitionConfig;
use millcut::graph::{CsrGraph, NodeId};
use millcut::metrics;
use millcut::parallel::build_seeded_pool;
use millcut::partitioner::perform_partitioning;
use millcut::rng::worker_rng;
use support::*;

fn random_connected_graph(n: usize, extra_edge_prob: f64, seed: u64) -> CsrGraph {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut edges: Vec<(u32, u32)> = Vec::new();
    // random spanning tree keeps every vertex reachable
    for v in 1..n as u32 {
        let parent = rng.gen_range(0..v);
        edges.push((parent, v));
    }
    for u in 0..n as u32 {
        for v in (u + 2)..n as u32 {
            if rng.r#gen::<f64>() < extra_edge_prob {
                edges.push((u, v));
            }
        }
    }
    edges.sort_unstable();
    edges.dedup();
    graph_from_edges(n, &edges)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn pipeline_invariants_hold(
        n in 6usize..40,
        k in 2u32..5,
        extra in 0.05f64..0.4,
        seed in 0u64..1000,
    ) {
        prop_assume!(n >= 2 * k as usize);
        let mut g = random_connected_graph(n, extra, seed);
        let mut cfg = PartitionConfig {
            k,
            imbalance: 10.0,
            seed,
            initial_tries: 4,
            ..Default::default()
        };
        cfg.configure_balance(&g);
        let cut = perform_partitioning(&cfg, &mut g).unwrap();

        // 1. every vertex gets exactly one block in [0, k)
        for v in 0..n as u32 {
            prop_assert!(g.block(v) < k);
        }
        // 2. no empty block, and every block within the bound
        let weights = metrics::block_weights(&g, k);
        for &w in &weights {
            prop_assert!(w >= 1);
            prop_assert!(w <= cfg.upper_bound_partition);
        }
        // 3. the reported cut matches an independent recount
        prop_assert_eq!(cut, recount_cut(&g));
    }

    #[test]
    fn contractor_conserves_weight_sums(
        n in 4usize..32,
        extra in 0.05f64..0.5,
        clusters in 2usize..8,
        seed in 0u64..1000,
    ) {
        let g = random_connected_graph(n, extra, seed);
        let mut rng = SmallRng::seed_from_u64(seed ^ 0xabcd);
        // random surjective dense cluster map
        let n_coarse = clusters.min(n);
        let mut cluster: Vec<NodeId> = (0..n).map(|_| rng.gen_range(0..n_coarse) as NodeId).collect();
        for c in 0..n_coarse {
            cluster[c] = c as NodeId;
        }

        let coarse = contraction::contract_clustering(&g, &cluster, n_coarse).unwrap();

        // node weight conservation
        prop_assert_eq!(coarse.total_node_weight(), g.total_node_weight());
        // edge weight conservation over cross-cluster arcs
        let fine_cross: i64 = (0..n as u32)
            .map(|v| {
                g.adjacent(v)
                    .filter(|&(u, _)| cluster[v as usize] != cluster[u as usize])
                    .map(|(_, w)| w)
                    .sum::<i64>()
            })
            .sum();
        let coarse_arcs: i64 = (0..coarse.m()).map(|e| coarse.edge_weight(e)).sum();
        prop_assert_eq!(coarse_arcs, fine_cross);

        // the parallel contractor agrees
        let pool = build_seeded_pool(seed, 3).unwrap();
        let par = contraction::contract_clustering_parallel(&g, &cluster, n_coarse, &pool, 3).unwrap();
        prop_assert_eq!(par.total_node_weight(), coarse.total_node_weight());
        let par_arcs: i64 = (0..par.m()).map(|e| par.edge_weight(e)).sum();
        prop_assert_eq!(par_arcs, coarse_arcs);
    }
}

#[test]
fn coarsen_then_project_is_identity() {
    // build a hierarchy, partition the coarsest, project down without any
    // refinement, and check every vertex inherited its ancestor's label
    let g = grid(12, 12);
    let mut cfg = PartitionConfig {
        k: 2,
        imbalance: 5.0,
        seed: 5,
        coarse_size_factor: 10,
        ..Default::default()
    };
    cfg.configure_balance(&g);
    let pool = build_seeded_pool(cfg.seed, 1).unwrap();
    let levels = coarsening::coarsen(&g, &cfg, &pool, &mut worker_rng(cfg.seed, 0)).unwrap();
    assert!(!levels.is_empty(), "grid should coarsen");

    // arbitrary partition on the coarsest graph
    let coarsest = &levels.last().unwrap().graph;
    for v in 0..coarsest.n() as u32 {
        coarsest.set_block(v, v % 2);
    }

    // project down the hierarchy with identity moves
    for i in (0..levels.len()).rev() {
        let coarse = &levels[i].graph;
        let cluster = &levels[i].cluster;
        let finer_n = cluster.len();
        if i == 0 {
            for v in 0..finer_n as u32 {
                g.set_block(v, coarse.block(cluster[v as usize]));
            }
        } else {
            let finer = &levels[i - 1].graph;
            for v in 0..finer_n as u32 {
                finer.set_block(v, coarse.block(cluster[v as usize]));
            }
        }
    }

    // every input vertex carries the label of its coarsest ancestor
    let coarsest = &levels.last().unwrap().graph;
    for v in 0..g.n() as u32 {
        let mut ancestor = v;
        for level in &levels {
            ancestor = level.cluster[ancestor as usize];
        }
        assert_eq!(g.block(v), coarsest.block(ancestor));
    }
}
