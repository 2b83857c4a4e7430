//! Initial partitioning of the coarsest graph.
//!
//! Greedy graph growing: the first k-1 blocks are grown by breadth-first
//! search from random seeds until they reach the balanced target weight, the
//! last block takes the remainder, and a repair pass fixes empty or
//! overloaded blocks. Several attempts run and the best cut wins.

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::Rng;

use crate::config::PartitionConfig;
use crate::graph::{BlockId, CsrGraph, NodeId, NodeWeight};
use crate::metrics;
use crate::rng::permute;

/// Partition `graph` into `config.k` blocks from scratch.
pub fn initial_partition(config: &PartitionConfig, graph: &CsrGraph, rng: &mut SmallRng) {
    let tries = config.initial_tries.max(1);
    let mut best_labels: Option<(i64, Vec<BlockId>)> = None;

    for _ in 0..tries {
        grow_blocks(config, graph, rng);
        repair(config, graph, rng);
        let cut = metrics::edge_cut(graph);
        if best_labels.as_ref().is_none_or(|&(c, _)| cut < c) {
            best_labels = Some((cut, graph.export_partition()));
        }
    }

    if let Some((_, labels)) = best_labels {
        graph.import_partition(&labels);
    }
}

fn grow_blocks(config: &PartitionConfig, graph: &CsrGraph, rng: &mut SmallRng) {
    let k = config.k;
    let n = graph.n();
    let total: NodeWeight = graph.total_node_weight();
    let target = (total as f64 / k as f64).ceil() as NodeWeight;

    const UNASSIGNED: BlockId = BlockId::MAX;
    let mut label: Vec<BlockId> = vec![UNASSIGNED; n];
    let mut assigned = 0usize;

    for block in 0..k.saturating_sub(1) {
        let mut weight: NodeWeight = 0;
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        while weight < target && assigned < n {
            let (v, fresh_seed) = match queue.pop_front() {
                Some(v) => (v, false),
                None => {
                    // fresh random seed in the unassigned remainder
                    let mut seed = rng.gen_range(0..n);
                    while label[seed] != UNASSIGNED {
                        seed = (seed + 1) % n;
                    }
                    (seed as NodeId, true)
                }
            };
            if label[v as usize] != UNASSIGNED {
                continue;
            }
            if weight + graph.node_weight(v) > target && weight > 0 {
                if fresh_seed {
                    // nothing left that fits; the block is as full as it gets
                    break;
                }
                continue;
            }
            label[v as usize] = block;
            weight += graph.node_weight(v);
            assigned += 1;
            for (u, _) in graph.adjacent(v) {
                if label[u as usize] == UNASSIGNED {
                    queue.push_back(u);
                }
            }
        }
    }

    // remainder goes to the last block
    for l in label.iter_mut() {
        if *l == UNASSIGNED {
            *l = k - 1;
        }
    }
    for (v, &l) in label.iter().enumerate() {
        graph.set_block(v as NodeId, l);
    }
}

/// Fix empty blocks, then drain overloaded blocks into the lightest ones.
fn repair(config: &PartitionConfig, graph: &CsrGraph, rng: &mut SmallRng) {
    let k = config.k;
    let mut weights = metrics::block_weights(graph, k);
    let mut sizes = vec![0usize; k as usize];
    for v in 0..graph.n() as NodeId {
        sizes[graph.block(v) as usize] += 1;
    }

    let mut order: Vec<NodeId> = (0..graph.n() as NodeId).collect();
    permute(&mut order, rng);

    // no block may be empty
    for empty in 0..k {
        while sizes[empty as usize] == 0 {
            let donor = (0..k)
                .filter(|&b| sizes[b as usize] > 1)
                .max_by_key(|&b| weights[b as usize])
                .expect("n >= k leaves a splittable block");
            let v = order
                .iter()
                .copied()
                .find(|&v| graph.block(v) == donor)
                .expect("donor block is non-empty");
            relabel(graph, &mut weights, &mut sizes, v, donor, empty);
        }
    }

    // respect the weight bound where possible
    let bound = config.upper_bound_partition;
    let mut stuck = 0usize;
    while let Some(over) = (0..k).find(|&b| weights[b as usize] > bound) {
        let under = (0..k)
            .min_by_key(|&b| weights[b as usize])
            .expect("k >= 2");
        if under == over || stuck > graph.n() {
            break;
        }
        let candidate = order
            .iter()
            .copied()
            .find(|&v| graph.block(v) == over && sizes[over as usize] > 1);
        match candidate {
            Some(v) => relabel(graph, &mut weights, &mut sizes, v, over, under),
            None => break,
        }
        stuck += 1;
    }
}

fn relabel(
    graph: &CsrGraph,
    weights: &mut [NodeWeight],
    sizes: &mut [usize],
    v: NodeId,
    from: BlockId,
    to: BlockId,
) {
    graph.set_block(v, to);
    let w = graph.node_weight(v);
    weights[from as usize] -= w;
    weights[to as usize] += w;
    sizes[from as usize] -= 1;
    sizes[to as usize] += 1;
}
