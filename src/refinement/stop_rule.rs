//! Stopping rules for localized FM search.
//!
//! A rule observes the gain of every accepted move and decides when a round
//! should give up on finding a better cut. Three variants:
//!
//! - **Simple**: a fixed budget of moves past the best seen cut.
//! - **Adaptive**: the classical statistical test — stop once
//!   `p * mu^2 > alpha * sigma^2 + beta`, where `p` is the number of moves
//!   since the last improvement, `mu`/`sigma^2` the running mean and variance
//!   of observed gains, `alpha` a configured scale and `beta = ln n`.
//! - **ChernoffAdaptive**: bounds the probability that the next `x` moves
//!   recover the best cut by `exp(-x * mu^2 / (2 sigma^2))` and tunes `x` by
//!   gradient descent so the bound meets the configured stop probability,
//!   clamped to `[min_step_limit, max_step_limit]`.
//!
//! Statistics reset whenever the search finds a new best cut, so every rule
//! measures the unproductive tail only.

use crate::config::{PartitionConfig, StopRuleKind};
use crate::graph::Gain;

/// Tagged stop rule; capability set `{should_stop, push_statistics,
/// reset_statistics}`.
#[derive(Debug)]
pub enum StopRule {
    Simple {
        limit: usize,
    },
    Adaptive {
        alpha: f64,
        beta: f64,
        count: usize,
        mean: f64,
        m2: f64,
    },
    ChernoffAdaptive {
        stop_probability: f64,
        descent_steps: usize,
        descent_step_size: f64,
        min_limit: usize,
        max_limit: usize,
        count: usize,
        mean: f64,
        m2: f64,
    },
}

impl StopRule {
    /// Build the configured rule; `n` is the node count of the current graph
    /// and `step_limit` the per-round budget scale.
    pub fn new(config: &PartitionConfig, n: usize, step_limit: usize) -> Self {
        match config.kway_stop_rule {
            StopRuleKind::Simple => StopRule::Simple {
                limit: step_limit.max(1),
            },
            StopRuleKind::Adaptive => StopRule::Adaptive {
                alpha: config.kway_adaptive_limits_alpha,
                beta: (n.max(2) as f64).ln(),
                count: 0,
                mean: 0.0,
                m2: 0.0,
            },
            StopRuleKind::ChernoffAdaptive => StopRule::ChernoffAdaptive {
                stop_probability: config.chernoff_stop_probability,
                descent_steps: config.chernoff_gradient_descent_num_steps,
                descent_step_size: config.chernoff_gradient_descent_step_size,
                min_limit: config.chernoff_min_step_limit,
                max_limit: config.chernoff_max_step_limit,
                count: 0,
                mean: 0.0,
                m2: 0.0,
            },
        }
    }

    /// Should the round stop? `steps_since_best` counts accepted moves since
    /// the best seen cut.
    pub fn should_stop(&self, steps_since_best: usize) -> bool {
        match self {
            StopRule::Simple { limit } => steps_since_best > *limit,
            StopRule::Adaptive {
                alpha,
                beta,
                count,
                mean,
                m2,
            } => {
                if *count < 2 {
                    return false;
                }
                let variance = m2 / (*count as f64 - 1.0);
                steps_since_best as f64 * mean * mean > alpha * variance + beta
            }
            StopRule::ChernoffAdaptive {
                min_limit,
                max_limit,
                count,
                mean,
                ..
            } => {
                if *count < 2 || *mean >= 0.0 {
                    // gains still trending up; never stop before the floor
                    return steps_since_best > *max_limit;
                }
                let limit = self.tuned_step_limit();
                debug_assert!((*min_limit..=*max_limit).contains(&limit));
                steps_since_best > limit
            }
        }
    }

    /// Record the gain of an accepted move.
    pub fn push_statistics(&mut self, gain: Gain) {
        match self {
            StopRule::Simple { .. } => {}
            StopRule::Adaptive {
                count, mean, m2, ..
            }
            | StopRule::ChernoffAdaptive {
                count, mean, m2, ..
            } => {
                // Welford's running mean/variance
                *count += 1;
                let x = gain as f64;
                let delta = x - *mean;
                *mean += delta / *count as f64;
                *m2 += delta * (x - *mean);
            }
        }
    }

    /// Forget the tail statistics; called on every new best cut.
    pub fn reset_statistics(&mut self) {
        match self {
            StopRule::Simple { .. } => {}
            StopRule::Adaptive {
                count, mean, m2, ..
            }
            | StopRule::ChernoffAdaptive {
                count, mean, m2, ..
            } => {
                *count = 0;
                *mean = 0.0;
                *m2 = 0.0;
            }
        }
    }

    /// Chernoff step limit: smallest `x` whose recovery-probability bound
    /// drops below `1 - stop_probability`, approached by gradient descent on
    /// the squared bound gap and clamped to the configured window.
    fn tuned_step_limit(&self) -> usize {
        let StopRule::ChernoffAdaptive {
            stop_probability,
            descent_steps,
            descent_step_size,
            min_limit,
            max_limit,
            count,
            mean,
            m2,
        } = self
        else {
            unreachable!("tuned_step_limit on a non-Chernoff rule");
        };
        let variance = (m2 / (*count as f64 - 1.0)).max(1e-9);
        let rate = mean * mean / (2.0 * variance);
        let target = 1.0 - stop_probability;

        // closed form as the starting point, descent to polish
        let mut x = (-(target.ln()) / rate).clamp(*min_limit as f64, *max_limit as f64);
        for _ in 0..*descent_steps {
            let bound = (-rate * x).exp();
            let gap = bound - target;
            // d/dx (bound - target)^2 = -2 * gap * rate * bound
            let gradient = -2.0 * gap * rate * bound;
            x = (x - descent_step_size * gradient).clamp(*min_limit as f64, *max_limit as f64);
        }
        x.round() as usize
    }
}
