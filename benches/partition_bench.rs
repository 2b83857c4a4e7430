use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use millcut::config::PartitionConfig;
use millcut::graph::{CsrGraph, GraphBuilder};
use millcut::partitioner::perform_partitioning;

// Synthetic Erdos-Renyi graph over a spanning tree, so it stays connected.
fn random_graph(n: usize, p: f64, seed: u64) -> CsrGraph {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut edges: Vec<(u32, u32)> = Vec::new();
    for v in 1..n as u32 {
        edges.push((rng.gen_range(0..v), v));
    }
    for u in 0..n as u32 {
        for v in (u + 2)..n as u32 {
            if rng.r#gen::<f64>() < p {
                edges.push((u, v));
            }
        }
    }
    edges.sort_unstable();
    edges.dedup();

    let mut b = GraphBuilder::new(n, 2 * edges.len());
    for v in 0..n as u32 {
        b.new_node(1);
        for &(x, y) in &edges {
            if x == v {
                b.new_edge(y, 1).unwrap();
            } else if y == v {
                b.new_edge(x, 1).unwrap();
            }
        }
    }
    b.finish().unwrap()
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    group.sample_size(10);

    for &(n, p) in &[(1_000usize, 0.01), (5_000, 0.002)] {
        for &threads in &[1usize, 4] {
            let id = BenchmarkId::new(format!("n{n}_p{p}"), threads);
            group.bench_with_input(id, &threads, |bench, &threads| {
                bench.iter(|| {
                    let mut graph = random_graph(n, p, 42);
                    let mut cfg = PartitionConfig {
                        k: 8,
                        imbalance: 3.0,
                        seed: 42,
                        num_threads: threads,
                        parallel_multitry_kway: threads > 1,
                        ..Default::default()
                    };
                    cfg.configure_balance(&graph);
                    perform_partitioning(&cfg, &mut graph).unwrap()
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);
