//! Quotient-graph scheduling: which pair of blocks to refine next.
//!
//! Both strategies draw from a bank-account budget of
//! `ceil(bank_account_factor * |Q|)` pair visits. The simple strategy
//! replays the initial edge set round after round while something improved;
//! the active-blocks strategy only schedules pairs touching a block that was
//! recently improved (all blocks start active, and the k-way interleave can
//! re-activate blocks it touched).

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::config::SchedulerKind;
use crate::graph::{BlockId, EdgeWeight};
use crate::refinement::boundary::{BlockPair, QuotientBoundary};

/// Tagged scheduler; capability set `{next_pair, has_finished,
/// push_statistics}` plus active-blocks re-activation.
#[derive(Debug)]
pub enum QuotientScheduler {
    Simple {
        initial: Vec<BlockPair>,
        queue: VecDeque<BlockPair>,
        round_improved: bool,
        pops: usize,
        budget: usize,
    },
    ActiveBlocks {
        queue: VecDeque<BlockPair>,
        active: HashSet<BlockId>,
        pops: usize,
        budget: usize,
    },
}

impl QuotientScheduler {
    pub fn new(kind: SchedulerKind, edges: &[(BlockPair, EdgeWeight)], factor: f64) -> Self {
        let pairs: Vec<BlockPair> = edges.iter().map(|&(p, _)| p).collect();
        let budget = (factor * pairs.len() as f64).ceil() as usize;
        match kind {
            SchedulerKind::Simple => QuotientScheduler::Simple {
                queue: pairs.iter().copied().collect(),
                initial: pairs,
                round_improved: false,
                pops: 0,
                budget,
            },
            SchedulerKind::ActiveBlocks | SchedulerKind::ActiveBlocksRefKway => {
                let active = pairs.iter().flat_map(|&(a, b)| [a, b]).collect();
                QuotientScheduler::ActiveBlocks {
                    queue: pairs.into_iter().collect(),
                    active,
                    pops: 0,
                    budget,
                }
            }
        }
    }

    /// Next pair to refine, or `None` when the budget is spent or nothing is
    /// left to schedule. `boundary` supplies the current quotient edges when
    /// a new round starts.
    pub fn next_pair(&mut self, boundary: &QuotientBoundary) -> Option<BlockPair> {
        match self {
            QuotientScheduler::Simple {
                initial,
                queue,
                round_improved,
                pops,
                budget,
            } => {
                if *pops >= *budget {
                    return None;
                }
                if queue.is_empty() {
                    if !*round_improved {
                        return None;
                    }
                    queue.extend(initial.iter().copied());
                    *round_improved = false;
                }
                *pops += 1;
                queue.pop_front()
            }
            QuotientScheduler::ActiveBlocks {
                queue,
                active,
                pops,
                budget,
            } => {
                if *pops >= *budget {
                    return None;
                }
                if queue.is_empty() {
                    // new round over the pairs of currently active blocks
                    for (pair, _) in boundary.quotient_edges() {
                        if active.contains(&pair.0) || active.contains(&pair.1) {
                            queue.push_back(pair);
                        }
                    }
                    active.clear();
                    if queue.is_empty() {
                        return None;
                    }
                }
                *pops += 1;
                queue.pop_front()
            }
        }
    }

    /// Feed back the result of refining `pair`.
    pub fn push_statistics(&mut self, pair: BlockPair, improvement: EdgeWeight, changed: bool) {
        match self {
            QuotientScheduler::Simple { round_improved, .. } => {
                if improvement > 0 || changed {
                    *round_improved = true;
                }
            }
            QuotientScheduler::ActiveBlocks { active, .. } => {
                if improvement > 0 || changed {
                    active.insert(pair.0);
                    active.insert(pair.1);
                }
            }
        }
    }

    /// Re-activate blocks the k-way interleave touched.
    pub fn activate_blocks(&mut self, touched: &HashMap<BlockId, BlockId>) {
        if let QuotientScheduler::ActiveBlocks { active, .. } = self {
            active.extend(touched.keys().copied());
        }
    }
}
