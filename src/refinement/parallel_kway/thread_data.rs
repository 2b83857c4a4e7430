//! Per-worker state for speculative k-way refinement.

use std::sync::atomic::{AtomicBool, AtomicU32};

use hashbrown::HashMap;

use crate::config::PartitionConfig;
use crate::graph::{BlockId, CsrGraph, Gain, NodeId, NodeWeight};
use crate::refinement::boundary::QuotientBoundary;
use crate::refinement::gain_pq::GainQueue;
use crate::rng::{mix_seed, BitRng};

/// State shared by all workers during one exploration phase. Everything here
/// is read-only or lock-free: the graph's labels are not written until the
/// serialized apply phase.
pub struct SharedExplore<'a> {
    pub graph: &'a CsrGraph,
    pub config: &'a PartitionConfig,
    /// Claim bits: a vertex belongs to at most one worker's round.
    pub moved_idx: &'a [AtomicBool],
    /// Workers poll this between queue pops and wind down once any worker
    /// finishes its seeds.
    pub num_threads_finished: &'a AtomicU32,
}

/// One exploration round's slice of the transposition log.
#[derive(Debug, Clone, Copy)]
pub struct RoundLog {
    pub start: usize,
    pub end: usize,
    /// Absolute log index of the round's best seen cut; `None` when the
    /// round found nothing worth keeping. Entries `start..=min_cut_index`
    /// are candidates for the apply phase.
    pub min_cut_index: Option<usize>,
}

/// Thread-private refinement state: the worker's queue, its speculative view
/// of the partition, and the transposition log feeding the apply phase.
pub struct ThreadData {
    pub id: usize,
    pub bit: BitRng,
    pub queue: GainQueue,
    /// Locally-shadowed block labels, diverging from the shared graph while
    /// the round explores; cleared after every round.
    pub shadow: HashMap<NodeId, BlockId>,
    /// Speculative per-block weights and sizes, seeded from the boundary
    /// aggregates at phase start.
    pub parts_weights: Vec<NodeWeight>,
    pub parts_sizes: Vec<usize>,
    /// This phase's seed vertices.
    pub start_nodes: Vec<NodeId>,
    /// Vertices whose claim bit this worker set; cleared after apply.
    pub claimed: Vec<NodeId>,
    /// Transposition log: `(node, from, to, gain)` column-wise.
    pub transpositions: Vec<NodeId>,
    pub from_blocks: Vec<BlockId>,
    pub to_blocks: Vec<BlockId>,
    pub gains: Vec<Gain>,
    pub rounds: Vec<RoundLog>,
    pub step_limit: usize,
    // round statistics
    pub accepted_moves: usize,
    pub stop_empty_queue: usize,
    pub stop_stopping_rule: usize,
    pub stop_max_moves: usize,
    pub stop_peer_finished: usize,
}

impl ThreadData {
    pub fn new(id: usize, config: &PartitionConfig, span: Gain) -> Self {
        Self {
            id,
            bit: BitRng::new(mix_seed(config.seed, id)),
            queue: GainQueue::new(config.use_bucket_queues, span),
            shadow: HashMap::new(),
            parts_weights: vec![0; config.k as usize],
            parts_sizes: vec![0; config.k as usize],
            start_nodes: Vec::new(),
            claimed: Vec::new(),
            transpositions: Vec::new(),
            from_blocks: Vec::new(),
            to_blocks: Vec::new(),
            gains: Vec::new(),
            rounds: Vec::new(),
            step_limit: 0,
            accepted_moves: 0,
            stop_empty_queue: 0,
            stop_stopping_rule: 0,
            stop_max_moves: 0,
            stop_peer_finished: 0,
        }
    }

    /// Refresh the speculative block aggregates from the shared boundary at
    /// the start of a phase.
    pub fn sync_aggregates(&mut self, boundary: &QuotientBoundary, k: u32) {
        for b in 0..k {
            self.parts_weights[b as usize] = boundary.block_weight(b);
            self.parts_sizes[b as usize] = boundary.block_no_nodes(b);
        }
    }

    /// Block of `v` in this worker's speculative view.
    #[inline]
    pub fn local_block(&self, graph: &CsrGraph, v: NodeId) -> BlockId {
        self.shadow.get(&v).copied().unwrap_or_else(|| graph.block(v))
    }

    #[inline]
    pub fn set_local_block(&mut self, v: NodeId, b: BlockId) {
        self.shadow.insert(v, b);
    }

    /// Drop all phase-local state once the apply phase has consumed the log.
    pub fn reset_phase(&mut self) {
        self.queue.clear();
        self.shadow.clear();
        self.start_nodes.clear();
        self.claimed.clear();
        self.transpositions.clear();
        self.from_blocks.clear();
        self.to_blocks.clear();
        self.gains.clear();
        self.rounds.clear();
    }
}
