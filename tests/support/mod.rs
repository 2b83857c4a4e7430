//! Shared graph construction helpers for the integration tests.
#![allow(dead_code)]

use millcut::graph::{CsrGraph, EdgeWeight, GraphBuilder, NodeId, NodeWeight};

/// Build a unit-edge-weight graph from an undirected edge list.
pub fn graph_from_edges(n: usize, edges: &[(u32, u32)]) -> CsrGraph {
    weighted_graph(vec![1; n], &edges.iter().map(|&(a, b)| (a, b, 1)).collect::<Vec<_>>())
}

/// Build a graph with explicit node weights and weighted undirected edges.
pub fn weighted_graph(node_weights: Vec<NodeWeight>, edges: &[(u32, u32, EdgeWeight)]) -> CsrGraph {
    let n = node_weights.len();
    let mut b = GraphBuilder::new(n, 2 * edges.len());
    for v in 0..n as u32 {
        b.new_node(node_weights[v as usize]);
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

pub fn path(n: usize) -> CsrGraph {
    let edges: Vec<(u32, u32)> = (0..n as u32 - 1).map(|v| (v, v + 1)).collect();
    graph_from_edges(n, &edges)
}

pub fn grid(rows: usize, cols: usize) -> CsrGraph {
    let mut edges = Vec::new();
    let at = |r: usize, c: usize| (r * cols + c) as u32;
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                edges.push((at(r, c), at(r, c + 1)));
            }
            if r + 1 < rows {
                edges.push((at(r, c), at(r + 1, c)));
            }
        }
    }
    graph_from_edges(rows * cols, &edges)
}

pub fn clique_pair(size: usize) -> CsrGraph {
    let mut edges = Vec::new();
    for base in [0, size as u32] {
        for i in 0..size as u32 {
            for j in (i + 1)..size as u32 {
                edges.push((base + i, base + j));
            }
        }
    }
    edges.push((size as u32 - 1, size as u32));
    graph_from_edges(2 * size, &edges)
}

pub fn complete_bipartite(a: usize, b: usize) -> CsrGraph {
    let mut edges = Vec::new();
    for i in 0..a as u32 {
        for j in 0..b as u32 {
            edges.push((i, a as u32 + j));
        }
    }
    graph_from_edges(a + b, &edges)
}

pub fn star(leaves: usize) -> CsrGraph {
    let edges: Vec<(u32, u32)> = (1..=leaves as u32).map(|l| (0, l)).collect();
    graph_from_edges(leaves + 1, &edges)
}

/// Independent cut recomputation straight off the arcs.
pub fn recount_cut(graph: &CsrGraph) -> EdgeWeight {
    let mut directed = 0;
    for v in 0..graph.n() as NodeId {
        for (u, w) in graph.adjacent(v) {
            if graph.block(v) != graph.block(u) {
                directed += w;
            }
        }
    }
    directed / 2
}
