//! Cluster contraction: build the next coarser graph from a clustering.
//!
//! Three interchangeable strategies share the contract
//! `(G, cluster[], n_coarse) -> G_coarse`: a matching walk for pairwise
//! matchings, a sequential hash-map aggregation, and a parallel aggregation
//! over concurrent hash shards. For every pair of clusters `(a, b)`, `a != b`,
//! the coarse edge weight equals the summed weight of cross-cluster fine
//! edges between them; coarse node weights are summed per cluster; self-loops
//! (intra-cluster edges) vanish.
//!
//! Key encodings: the sequential and single-map paths canonicalize `(a, b)`
//! into a sorted 64-bit key, so each undirected coarse edge aggregates the
//! weight of both fine arc directions and is halved on materialization. The
//! sharded path keeps direction in the key and aggregates each directed arc
//! exactly once, so no halving happens there. The two encodings must never
//! meet in one table.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};

use dashmap::DashMap;
use hashbrown::HashMap;
use rayon::ThreadPool;

use crate::error::PartitionError;
use crate::graph::{CsrGraph, EdgeId, EdgeWeight, GraphBuilder, NodeId, NodeWeight};

const UNDEFINED_EDGE: EdgeId = EdgeId::MAX;

/// Sorted pair key: deduplicates `(a, b)` and `(b, a)`.
#[inline]
fn key_sorted(a: NodeId, b: NodeId) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    ((lo as u64) << 32) | hi as u64
}

/// Direction-preserving pair key.
#[inline]
fn key_directed(from: NodeId, to: NodeId) -> u64 {
    ((from as u64) << 32) | to as u64
}

#[inline]
fn split_key(key: u64) -> (NodeId, NodeId) {
    ((key >> 32) as NodeId, key as NodeId)
}

/// Vertex-block granularity for the parallel scans: `max(1000, floor(sqrt(n)))`.
#[inline]
fn scan_block_size(n: usize) -> usize {
    ((n as f64).sqrt() as usize).max(1000)
}

/// Contract a pairwise matching.
///
/// `matching[v]` is `v`'s partner (or `v` itself when unmatched) and
/// `permutation` fixes the walk order; the representative of each coarse
/// vertex is the first of the pair encountered. Aggregation runs through a
/// scratch array holding, per coarse neighbour, the position of its arc in
/// the adjacency under construction; only entries touched by the current
/// coarse vertex are reset, keeping the walk O(deg) per vertex.
pub fn contract_matching(
    graph: &CsrGraph,
    matching: &[NodeId],
    cluster: &[NodeId],
    n_coarse: usize,
    permutation: &[NodeId],
) -> Result<CsrGraph, PartitionError> {
    let coarse_targets: Vec<NodeId> = (0..graph.m())
        .map(|e| cluster[graph.target(e) as usize])
        .collect();

    let mut edge_positions: Vec<EdgeId> = vec![UNDEFINED_EDGE; n_coarse];
    let mut builder = GraphBuilder::new(n_coarse, graph.m());
    let mut next_coarse: NodeId = 0;

    for &node in permutation {
        if cluster[node as usize] != next_coarse {
            continue;
        }
        let coarse_node = builder.new_node(graph.node_weight(node));
        let start = builder.edges_built();

        visit_edges(graph, &mut builder, &mut edge_positions, coarse_node, node, &coarse_targets)?;

        let partner = matching[node as usize];
        if partner != node {
            // matched pair folds into one coarse vertex
            builder.set_last_node_weight(graph.node_weight(node) + graph.node_weight(partner));
            visit_edges(
                graph,
                &mut builder,
                &mut edge_positions,
                coarse_node,
                partner,
                &coarse_targets,
            )?;
        }

        for e in start..builder.edges_built() {
            edge_positions[builder.built_target(e) as usize] = UNDEFINED_EDGE;
        }
        next_coarse += 1;
    }

    debug_assert_eq!(next_coarse as usize, n_coarse);
    builder.finish()
}

fn visit_edges(
    graph: &CsrGraph,
    builder: &mut GraphBuilder,
    edge_positions: &mut [EdgeId],
    coarse_node: NodeId,
    node: NodeId,
    coarse_targets: &[NodeId],
) -> Result<(), PartitionError> {
    for e in graph.edges_of(node) {
        let coarse_target = coarse_targets[e];
        if coarse_target == coarse_node {
            continue;
        }
        let w = graph.edge_weight(e);
        match edge_positions[coarse_target as usize] {
            UNDEFINED_EDGE => {
                let pos = builder.new_edge(coarse_target, w)?;
                edge_positions[coarse_target as usize] = pos;
            }
            pos => builder.add_edge_weight(pos, w),
        }
    }
    Ok(())
}

/// Sequential clustering contraction via one hash map with sorted keys.
pub fn contract_clustering(
    graph: &CsrGraph,
    cluster: &[NodeId],
    n_coarse: usize,
) -> Result<CsrGraph, PartitionError> {
    let mut cluster_weights: Vec<NodeWeight> = vec![0; n_coarse];
    let mut cut_edges: HashMap<u64, EdgeWeight> =
        HashMap::with_capacity(estimated_cut_edges(graph, n_coarse));

    for v in 0..graph.n() as NodeId {
        let source = cluster[v as usize];
        cluster_weights[source as usize] += graph.node_weight(v);
        for (u, w) in graph.adjacent(v) {
            let target = cluster[u as usize];
            if source != target {
                *cut_edges.entry(key_sorted(source, target)).or_insert(0) += w;
            }
        }
    }

    materialize_sorted(&cut_edges, &cluster_weights, n_coarse)
}

/// Parallel clustering contraction.
///
/// With one thread the aggregation goes through a single shared concurrent
/// map (sorted keys, halved on materialization); with more threads every
/// cross-cluster arc is routed to shard `source_cluster % T` under a
/// direction-preserving key, and the coarse CSR is assembled in parallel by
/// degree counting, an exclusive scan, and a fetch-add scatter.
pub fn contract_clustering_parallel(
    graph: &CsrGraph,
    cluster: &[NodeId],
    n_coarse: usize,
    pool: &ThreadPool,
    num_threads: usize,
) -> Result<CsrGraph, PartitionError> {
    if num_threads > 1 {
        contract_sharded(graph, cluster, n_coarse, pool, num_threads)
    } else {
        contract_single_map(graph, cluster, n_coarse, pool)
    }
}

fn contract_single_map(
    graph: &CsrGraph,
    cluster: &[NodeId],
    n_coarse: usize,
    pool: &ThreadPool,
) -> Result<CsrGraph, PartitionError> {
    let cut_edges: DashMap<u64, EdgeWeight> =
        DashMap::with_capacity(estimated_cut_edges(graph, n_coarse));
    let cursor = AtomicUsize::new(0);
    let block_size = scan_block_size(graph.n());

    let per_worker: Vec<Vec<NodeWeight>> = pool.broadcast(|_| {
        let mut local_weights = vec![0; n_coarse];
        loop {
            let begin = cursor.fetch_add(block_size, Ordering::Relaxed);
            if begin >= graph.n() {
                break;
            }
            let end = (begin + block_size).min(graph.n());
            for v in begin as NodeId..end as NodeId {
                let source = cluster[v as usize];
                local_weights[source as usize] += graph.node_weight(v);
                for (u, w) in graph.adjacent(v) {
                    let target = cluster[u as usize];
                    if source != target {
                        *cut_edges.entry(key_sorted(source, target)).or_insert(0) += w;
                    }
                }
            }
        }
        local_weights
    });

    let mut cluster_weights = vec![0; n_coarse];
    for local in per_worker {
        for (acc, w) in cluster_weights.iter_mut().zip(local) {
            *acc += w;
        }
    }

    let merged: HashMap<u64, EdgeWeight> =
        cut_edges.into_iter().collect();
    materialize_sorted(&merged, &cluster_weights, n_coarse)
}

fn contract_sharded(
    graph: &CsrGraph,
    cluster: &[NodeId],
    n_coarse: usize,
    pool: &ThreadPool,
    num_threads: usize,
) -> Result<CsrGraph, PartitionError> {
    let shard_cap = 2 * estimated_cut_edges(graph, n_coarse) / num_threads.max(1) + 16;
    let shards: Vec<DashMap<u64, EdgeWeight>> = (0..num_threads)
        .map(|_| DashMap::with_capacity(shard_cap))
        .collect();
    let cursor = AtomicUsize::new(0);
    let block_size = scan_block_size(graph.n());

    // Aggregation: every directed cross-cluster arc lands in the shard owning
    // its source cluster, so shards hold disjoint key sets.
    let per_worker: Vec<Vec<NodeWeight>> = pool.broadcast(|_| {
        let mut local_weights = vec![0; n_coarse];
        loop {
            let begin = cursor.fetch_add(block_size, Ordering::Relaxed);
            if begin >= graph.n() {
                break;
            }
            let end = (begin + block_size).min(graph.n());
            for v in begin as NodeId..end as NodeId {
                let source = cluster[v as usize];
                local_weights[source as usize] += graph.node_weight(v);
                let shard = &shards[source as usize % num_threads];
                for (u, w) in graph.adjacent(v) {
                    let target = cluster[u as usize];
                    if source != target {
                        *shard.entry(key_directed(source, target)).or_insert(0) += w;
                    }
                }
            }
        }
        local_weights
    });

    let mut cluster_weights = vec![0; n_coarse];
    for local in per_worker {
        for (acc, w) in cluster_weights.iter_mut().zip(local) {
            *acc += w;
        }
    }

    // Degree counting per source cluster, one worker per shard.
    let degrees: Vec<AtomicUsize> = (0..n_coarse).map(|_| AtomicUsize::new(0)).collect();
    let shard_cursor = AtomicUsize::new(0);
    pool.broadcast(|_| loop {
        let s = shard_cursor.fetch_add(1, Ordering::Relaxed);
        if s >= shards.len() {
            break;
        }
        for entry in shards[s].iter() {
            let (from, _) = split_key(*entry.key());
            degrees[from as usize].fetch_add(1, Ordering::Relaxed);
        }
    });

    // Exclusive scan into the offset array.
    let mut first_edge: Vec<EdgeId> = Vec::with_capacity(n_coarse + 1);
    let mut prefix = 0usize;
    for d in &degrees {
        first_edge.push(prefix);
        prefix += d.load(Ordering::Relaxed);
    }
    first_edge.push(prefix);
    let m_coarse = prefix;

    // Scatter by fetch-add on per-vertex cursors.
    let cursors: Vec<AtomicUsize> = first_edge[..n_coarse]
        .iter()
        .map(|&o| AtomicUsize::new(o))
        .collect();
    let targets: Vec<AtomicU32> = (0..m_coarse).map(|_| AtomicU32::new(0)).collect();
    let weights: Vec<AtomicI64> = (0..m_coarse).map(|_| AtomicI64::new(0)).collect();
    let scatter_cursor = AtomicUsize::new(0);
    pool.broadcast(|_| loop {
        let s = scatter_cursor.fetch_add(1, Ordering::Relaxed);
        if s >= shards.len() {
            break;
        }
        for entry in shards[s].iter() {
            let (from, to) = split_key(*entry.key());
            let slot = cursors[from as usize].fetch_add(1, Ordering::Relaxed);
            targets[slot].store(to, Ordering::Relaxed);
            weights[slot].store(*entry.value(), Ordering::Relaxed);
        }
    });

    let targets: Vec<NodeId> = targets.into_iter().map(AtomicU32::into_inner).collect();
    let weights: Vec<EdgeWeight> = weights.into_iter().map(AtomicI64::into_inner).collect();
    CsrGraph::from_csr(cluster_weights, first_edge, targets, weights)
}

/// Build the coarse CSR from a sorted-key aggregate; stored weights carry
/// both arc directions and are halved here.
fn materialize_sorted(
    cut_edges: &HashMap<u64, EdgeWeight>,
    cluster_weights: &[NodeWeight],
    n_coarse: usize,
) -> Result<CsrGraph, PartitionError> {
    // hash order is not stable across runs; sorted keys keep the coarse
    // adjacency (and everything downstream of it) reproducible
    let mut entries: Vec<(u64, EdgeWeight)> = cut_edges.iter().map(|(&k, &w)| (k, w)).collect();
    entries.sort_unstable_by_key(|&(k, _)| k);

    let mut adjacency: Vec<Vec<(NodeId, EdgeWeight)>> = vec![Vec::new(); n_coarse];
    for (key, w) in entries {
        let (a, b) = split_key(key);
        let w = w / 2;
        adjacency[a as usize].push((b, w));
        adjacency[b as usize].push((a, w));
    }

    let mut builder = GraphBuilder::new(n_coarse, 2 * cut_edges.len());
    for (c, nbrs) in adjacency.iter().enumerate() {
        builder.new_node(cluster_weights[c]);
        for &(target, w) in nbrs {
            builder.new_edge(target, w)?;
        }
    }
    builder.finish()
}

fn estimated_cut_edges(graph: &CsrGraph, n_coarse: usize) -> usize {
    if graph.n() == 0 {
        return 0;
    }
    let avg_degree = graph.m() as f64 / graph.n() as f64;
    ((avg_degree * n_coarse as f64) as usize).min(graph.m() / 2).max(16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::parallel::build_seeded_pool;

    /// Weighted 6-vertex graph: two triangles {0,1,2} and {3,4,5} joined by
    /// edges (2,3) w=5 and (0,5) w=2; triangle edges have weight 1.
    fn two_triangles() -> CsrGraph {
        let edges: &[(u32, u32, i64)] = &[
            (0, 1, 1),
            (1, 2, 1),
            (0, 2, 1),
            (3, 4, 1),
            (4, 5, 1),
            (3, 5, 1),
            (2, 3, 5),
            (0, 5, 2),
        ];
        let mut b = GraphBuilder::new(6, 16);
        for v in 0..6u32 {
            b.new_node((v + 1) as i64);
            for &(x, y, w) in edges {
                if x == v {
                    b.new_edge(y, w).unwrap();
                } else if y == v {
                    b.new_edge(x, w).unwrap();
                }
            }
        }
        b.finish().unwrap()
    }

    fn check_conservation(fine: &CsrGraph, coarse: &CsrGraph, cluster: &[NodeId]) {
        assert_eq!(fine.total_node_weight(), coarse.total_node_weight());
        let fine_cross: EdgeWeight = (0..fine.n() as NodeId)
            .map(|v| {
                fine.adjacent(v)
                    .filter(|&(u, _)| cluster[v as usize] != cluster[u as usize])
                    .map(|(_, w)| w)
                    .sum::<EdgeWeight>()
            })
            .sum();
        let coarse_total: EdgeWeight =
            (0..coarse.m()).map(|e| coarse.edge_weight(e)).sum();
        assert_eq!(fine_cross, coarse_total);
    }

    #[test]
    fn sequential_clustering_collapses_triangles() {
        let g = two_triangles();
        let cluster = vec![0, 0, 0, 1, 1, 1];
        let coarse = contract_clustering(&g, &cluster, 2).unwrap();
        assert_eq!(coarse.n(), 2);
        // one coarse edge of weight 5 + 2, stored twice
        assert_eq!(coarse.m(), 2);
        assert_eq!(coarse.adjacent(0).collect::<Vec<_>>(), vec![(1, 7)]);
        assert_eq!(coarse.node_weight(0), 1 + 2 + 3);
        assert_eq!(coarse.node_weight(1), 4 + 5 + 6);
        check_conservation(&g, &coarse, &cluster);
    }

    #[test]
    fn matching_contraction_matches_clustering() {
        let g = two_triangles();
        // match (0,1), leave 2 single, match (3,4), leave 5 single
        let matching = vec![1, 0, 2, 4, 3, 5];
        let cluster = vec![0, 0, 1, 2, 2, 3];
        let permutation: Vec<NodeId> = (0..6).collect();
        let coarse = contract_matching(&g, &matching, &cluster, 4, &permutation).unwrap();
        assert_eq!(coarse.n(), 4);
        check_conservation(&g, &coarse, &cluster);
        let reference = contract_clustering(&g, &cluster, 4).unwrap();
        for c in 0..4u32 {
            assert_eq!(coarse.node_weight(c), reference.node_weight(c));
            let mut a: Vec<_> = coarse.adjacent(c).collect();
            let mut b: Vec<_> = reference.adjacent(c).collect();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn parallel_variants_agree_with_sequential() {
        let g = two_triangles();
        let cluster = vec![0, 1, 0, 2, 2, 1];
        let reference = contract_clustering(&g, &cluster, 3).unwrap();

        for threads in [1usize, 3] {
            let pool = build_seeded_pool(1, threads).unwrap();
            let coarse =
                contract_clustering_parallel(&g, &cluster, 3, &pool, threads).unwrap();
            assert_eq!(coarse.n(), reference.n());
            check_conservation(&g, &coarse, &cluster);
            for c in 0..3u32 {
                assert_eq!(coarse.node_weight(c), reference.node_weight(c));
                let mut a: Vec<_> = coarse.adjacent(c).collect();
                let mut b: Vec<_> = reference.adjacent(c).collect();
                a.sort_unstable();
                b.sort_unstable();
                assert_eq!(a, b, "cluster {c} with {threads} thread(s)");
            }
        }
    }

    #[test]
    fn identity_clustering_reproduces_graph() {
        let g = two_triangles();
        let cluster: Vec<NodeId> = (0..6).collect();
        let coarse = contract_clustering(&g, &cluster, 6).unwrap();
        assert_eq!(coarse.n(), g.n());
        assert_eq!(coarse.m(), g.m());
        check_conservation(&g, &coarse, &cluster);
    }
}
