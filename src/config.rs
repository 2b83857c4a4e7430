//! Run configuration for the partitioner.
//!
//! [`PartitionConfig`] is a plain data struct: the CLI layer fills it in,
//! [`PartitionConfig::configure_balance`] derives the per-block weight bound
//! once the graph is known, and everything downstream reads it immutably
//! (refinement passes that need to tweak a knob clone it).

use crate::error::PartitionError;
use crate::graph::{CsrGraph, NodeWeight};

/// Stopping rule for (multi-try) k-way FM rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRuleKind {
    /// Fixed move budget per round.
    Simple,
    /// Classical variance-based adaptive rule.
    Adaptive,
    /// Chernoff-bound rule with a gradient-descent-tuned step limit.
    ChernoffAdaptive,
}

/// Conflict policy used by the parallel apply phase when a speculative move
/// no longer matches the shared graph state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMoveStrategy {
    /// Run a fresh local FM search seeded at the first skipped node.
    LocalSearch,
    /// Re-derive gains from the shared state and keep improving moves.
    GainRecalculation,
    /// Abandon the tail; reseed the skipped node and its neighbours next round.
    ReactiveVertices,
    /// Abandon the tail silently.
    Skip,
}

/// Strategy for picking the next quotient edge to refine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    /// FIFO over the initial quotient edge set.
    Simple,
    /// Only pairs touching recently-improved blocks are scheduled.
    ActiveBlocks,
    /// Active blocks, interleaving localized k-way refinement per pair.
    ActiveBlocksRefKway,
}

/// Which two-way engines run on a scheduled quotient edge.
///
/// Flow-based refinement is an interface contract here (see
/// [`crate::refinement::two_way_fm::TwoWayFlowRefiner`]); only the FM path is
/// implemented, so `FmFlow`/`Flow` are rejected at argument validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementType {
    Fm,
    FmFlow,
    Flow,
}

/// Complete configuration of one partitioning run.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Number of blocks, >= 2.
    pub k: u32,
    /// Allowed imbalance in percent (epsilon * 100).
    pub imbalance: f64,
    /// Global RNG seed.
    pub seed: u64,
    /// Worker threads (including the calling thread).
    pub num_threads: usize,
    /// Core the main thread would be pinned to; recorded, pinning is left to the OS.
    pub main_core: usize,

    /// Per-block weight bound; derived by [`Self::configure_balance`].
    pub upper_bound_partition: NodeWeight,
    /// Total node weight of the input graph; set alongside the bound.
    pub total_graph_weight: NodeWeight,

    /// Refinement engine selection.
    pub parallel_multitry_kway: bool,
    pub label_propagation_refinement: bool,
    pub parallel_lp: bool,
    /// Node-block granularity for parallel label propagation.
    pub block_size: usize,
    /// Label propagation rounds per level.
    pub lp_rounds: usize,

    /// Two-way engines on quotient edges.
    pub refinement_type: RefinementType,
    pub quotient_graph_two_way_refinement: bool,
    pub scheduler: SchedulerKind,
    /// Budget multiplier for the quotient scheduler's bank account.
    pub bank_account_factor: f64,

    /// k-way FM knobs.
    pub kway_stop_rule: StopRuleKind,
    pub apply_move_strategy: ApplyMoveStrategy,
    /// Outer multi-try rounds per level.
    pub global_multitry_rounds: usize,
    /// Step-limit scale for the adaptive stop rules.
    pub kway_adaptive_limits_alpha: f64,
    /// Upper bound on moves per localized round; `None` means |V|.
    pub max_number_of_moves: Option<usize>,
    /// Reseed committed nodes and their neighbours when using reactive vertices.
    pub kway_all_boundary_nodes_refinement: bool,

    /// Chernoff stop rule tuning.
    pub chernoff_stop_probability: f64,
    pub chernoff_gradient_descent_num_steps: usize,
    pub chernoff_gradient_descent_step_size: f64,
    pub chernoff_min_step_limit: usize,
    pub chernoff_max_step_limit: usize,

    /// Use the bucket queue when the gain span permits.
    pub use_bucket_queues: bool,

    /// Coarsening: stop once the graph has at most `coarse_size_factor * k` nodes.
    pub coarse_size_factor: usize,
    /// Attempts of greedy growing at the coarsest level; best cut wins.
    pub initial_tries: usize,
    /// Use the sequential hash-map contraction even with threads available.
    pub force_sequential_contraction: bool,

    /// Refine a supplied partition instead of partitioning from scratch.
    pub input_partition: Option<String>,
    /// Skip coarsening; refine directly on the input graph.
    pub only_first_level: bool,
    /// The current graph already carries a partition worth keeping.
    pub graph_already_partitioned: bool,

    /// Run the perfectly-balanced post-pass.
    pub perfectly_balance: bool,
    /// Wall-clock budget for the outer repeat loop, seconds; 0 disables.
    pub time_limit: f64,

    /// Soft/hard rebalance switches consumed by two-way FM.
    pub softrebalance: bool,
    pub rebalance: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            k: 2,
            imbalance: 3.0,
            seed: 0,
            num_threads: 1,
            main_core: 0,
            upper_bound_partition: NodeWeight::MAX,
            total_graph_weight: 0,
            parallel_multitry_kway: false,
            label_propagation_refinement: false,
            parallel_lp: false,
            block_size: 1000,
            lp_rounds: 3,
            refinement_type: RefinementType::Fm,
            quotient_graph_two_way_refinement: true,
            scheduler: SchedulerKind::ActiveBlocksRefKway,
            bank_account_factor: 1.5,
            kway_stop_rule: StopRuleKind::Adaptive,
            apply_move_strategy: ApplyMoveStrategy::LocalSearch,
            global_multitry_rounds: 10,
            kway_adaptive_limits_alpha: 10.0,
            max_number_of_moves: None,
            kway_all_boundary_nodes_refinement: false,
            chernoff_stop_probability: 0.9,
            chernoff_gradient_descent_num_steps: 10,
            chernoff_gradient_descent_step_size: 0.05,
            chernoff_min_step_limit: 15,
            chernoff_max_step_limit: 500,
            use_bucket_queues: true,
            coarse_size_factor: 60,
            initial_tries: 4,
            force_sequential_contraction: false,
            input_partition: None,
            only_first_level: false,
            graph_already_partitioned: false,
            perfectly_balance: false,
            time_limit: 0.0,
            softrebalance: false,
            rebalance: false,
        }
    }
}

impl PartitionConfig {
    /// Epsilon as a fraction.
    pub fn epsilon(&self) -> f64 {
        self.imbalance / 100.0
    }

    /// Derive the per-block weight bound from the input graph:
    /// `W_max = ceil(total_weight * (1 + eps) / k)`.
    ///
    /// The bound is computed once on the input graph and reused down the
    /// hierarchy; contraction preserves total weight, so it stays valid on
    /// every level.
    pub fn configure_balance(&mut self, graph: &CsrGraph) {
        let total: NodeWeight = (0..graph.n()).map(|v| graph.node_weight(v as u32)).sum();
        self.total_graph_weight = total;
        self.upper_bound_partition =
            ((total as f64) * (1.0 + self.epsilon()) / self.k as f64).ceil() as NodeWeight;
    }

    /// Validate user-supplied values; called by the CLI before any work.
    pub fn validate(&self) -> Result<(), PartitionError> {
        if self.k < 2 {
            return Err(PartitionError::InvalidArguments(format!(
                "k must be >= 2, got {}",
                self.k
            )));
        }
        if !(0.0..=100.0).contains(&self.imbalance) {
            return Err(PartitionError::InvalidArguments(format!(
                "imbalance must be in [0, 100], got {}",
                self.imbalance
            )));
        }
        if self.num_threads == 0 {
            return Err(PartitionError::InvalidArguments(
                "num_threads must be >= 1".into(),
            ));
        }
        if matches!(
            self.refinement_type,
            RefinementType::FmFlow | RefinementType::Flow
        ) {
            return Err(PartitionError::InvalidArguments(
                "flow-based two-way refinement is not available in this build".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.chernoff_stop_probability) {
            return Err(PartitionError::InvalidArguments(format!(
                "chernoff_stop_probability must be in [0, 1), got {}",
                self.chernoff_stop_probability
            )));
        }
        if self.chernoff_min_step_limit > self.chernoff_max_step_limit {
            return Err(PartitionError::InvalidArguments(
                "chernoff_min_step_limit exceeds chernoff_max_step_limit".into(),
            ));
        }
        Ok(())
    }

    /// Switch into refine-only mode for an externally supplied partition.
    pub fn enable_input_partition_mode(&mut self) {
        self.only_first_level = true;
        self.graph_already_partitioned = true;
        self.perfectly_balance = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn unit_path(n: usize) -> CsrGraph {
        let mut b = GraphBuilder::new(n, 2 * (n - 1));
        for v in 0..n {
            b.new_node(1);
            if v > 0 {
                b.new_edge((v - 1) as u32, 1).unwrap();
            }
            if v + 1 < n {
                b.new_edge((v + 1) as u32, 1).unwrap();
            }
        }
        b.finish().unwrap()
    }

    #[test]
    fn balance_bound_path_graph() {
        let g = unit_path(10);
        let mut cfg = PartitionConfig {
            k: 2,
            imbalance: 3.0,
            ..Default::default()
        };
        cfg.configure_balance(&g);
        assert_eq!(cfg.total_graph_weight, 10);
        // ceil(10 * 1.03 / 2) = 6
        assert_eq!(cfg.upper_bound_partition, 6);
    }

    #[test]
    fn zero_imbalance_is_exact() {
        let g = unit_path(8);
        let mut cfg = PartitionConfig {
            k: 2,
            imbalance: 0.0,
            ..Default::default()
        };
        cfg.configure_balance(&g);
        assert_eq!(cfg.upper_bound_partition, 4);
    }

    #[test]
    fn rejects_small_k() {
        let cfg = PartitionConfig {
            k: 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
