//! Size-constrained label propagation clustering.
//!
//! Produces the vertex-to-cluster map consumed by the contractor: rounds over
//! a random vertex permutation in which each vertex adopts the neighbouring
//! cluster with the heaviest incident edge weight, subject to a cluster
//! weight bound. The returned map is dense in `[0, n_coarse)` and surjective.

use hashbrown::HashMap;
use rand::rngs::SmallRng;

use crate::graph::{CsrGraph, EdgeWeight, NodeId, NodeWeight};
use crate::rng;

/// Cluster the graph; returns the dense cluster map and the cluster count.
///
/// `max_cluster_weight` caps the total node weight of any cluster so that
/// coarse vertices stay placeable under the partition balance bound.
pub fn label_propagation(
    graph: &CsrGraph,
    max_cluster_weight: NodeWeight,
    rounds: usize,
    rng: &mut SmallRng,
) -> (Vec<NodeId>, usize) {
    let n = graph.n();
    let mut cluster: Vec<NodeId> = (0..n as NodeId).collect();
    let mut cluster_weight: Vec<NodeWeight> =
        (0..n as NodeId).map(|v| graph.node_weight(v)).collect();

    let mut order: Vec<NodeId> = (0..n as NodeId).collect();
    let mut incident: HashMap<NodeId, EdgeWeight> = HashMap::new();

    for _ in 0..rounds {
        rng::permute(&mut order, rng);
        let mut moved = 0usize;

        for &v in &order {
            let current = cluster[v as usize];
            incident.clear();
            for (u, w) in graph.adjacent(v) {
                *incident.entry(cluster[u as usize]).or_insert(0) += w;
            }
            if incident.is_empty() {
                continue;
            }

            let vw = graph.node_weight(v);
            let mut best = current;
            let mut best_weight = incident.get(&current).copied().unwrap_or(0);
            for (&c, &w) in &incident {
                if c == current {
                    continue;
                }
                // smallest-id tie-break keeps the map independent of hash order
                let wins = w > best_weight || (w == best_weight && best != current && c < best);
                if wins && cluster_weight[c as usize] + vw <= max_cluster_weight {
                    best = c;
                    best_weight = w;
                }
            }

            if best != current {
                cluster_weight[current as usize] -= vw;
                cluster_weight[best as usize] += vw;
                cluster[v as usize] = best;
                moved += 1;
            }
        }

        if moved == 0 {
            break;
        }
    }

    compact(&mut cluster)
}

/// Remap cluster ids onto a dense range in first-seen order; returns the
/// compacted map and the number of distinct clusters.
fn compact(cluster: &mut Vec<NodeId>) -> (Vec<NodeId>, usize) {
    let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
    for c in cluster.iter_mut() {
        let next = remap.len() as NodeId;
        *c = *remap.entry(*c).or_insert(next);
    }
    let n_coarse = remap.len();
    (std::mem::take(cluster), n_coarse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::rng::worker_rng;

    /// Two 4-cliques joined by one edge (3, 4).
    fn two_cliques() -> CsrGraph {
        let mut edges = Vec::new();
        for base in [0u32, 4u32] {
            for i in 0..4 {
                for j in (i + 1)..4 {
                    edges.push((base + i, base + j));
                }
            }
        }
        edges.push((3, 4));
        let mut b = GraphBuilder::new(8, 2 * edges.len());
        for v in 0..8u32 {
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

    #[test]
    fn cliques_collapse_into_clusters() {
        let g = two_cliques();
        let (cluster, n_coarse) = label_propagation(&g, 4, 5, &mut worker_rng(11, 0));
        assert!(n_coarse >= 2, "cliques cannot merge past the weight bound");
        // dense and surjective
        let mut seen = vec![false; n_coarse];
        for &c in &cluster {
            assert!((c as usize) < n_coarse);
            seen[c as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
        // each clique ends up in one cluster
        assert!((0..4).all(|v| cluster[v] == cluster[0]));
        assert!((4..8).all(|v| cluster[v] == cluster[4]));
        assert_ne!(cluster[0], cluster[4]);
    }

    #[test]
    fn weight_bound_is_respected() {
        let g = two_cliques();
        let (cluster, n_coarse) = label_propagation(&g, 2, 5, &mut worker_rng(3, 0));
        let mut weights = vec![0i64; n_coarse];
        for (v, &c) in cluster.iter().enumerate() {
            weights[c as usize] += g.node_weight(v as NodeId);
        }
        assert!(weights.iter().all(|&w| w <= 2));
    }

    #[test]
    fn isolated_vertices_keep_singleton_clusters() {
        let mut b = GraphBuilder::new(3, 0);
        for _ in 0..3 {
            b.new_node(1);
        }
        let g = b.finish().unwrap();
        let (cluster, n_coarse) = label_propagation(&g, 10, 3, &mut worker_rng(1, 0));
        assert_eq!(n_coarse, 3);
        assert_eq!(cluster, vec![0, 1, 2]);
    }
}
