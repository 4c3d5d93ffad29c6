//! Metric-call budget and stopping control
//!
//! The budget is a soft ceiling: an in-flight evaluation always completes and
//! is charged in full, but no new iteration starts once the ceiling is hit.
//! The controller also owns the optional perfect-score early exit.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tracks consumed metric calls against a ceiling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricBudget {
    max_metric_calls: usize,
    consumed: usize,
    perfect_score: f64,
    skip_perfect_score: bool,
}

impl MetricBudget {
    /// Create a budget with a ceiling and perfect-score settings
    pub fn new(max_metric_calls: usize, perfect_score: f64, skip_perfect_score: bool) -> Self {
        Self {
            max_metric_calls,
            consumed: 0,
            perfect_score,
            skip_perfect_score,
        }
    }

    /// Charge `n` metric calls and return the new total
    ///
    /// Charging past the ceiling is allowed (soft budget); exhaustion is only
    /// consulted between iterations.
    pub fn charge(&mut self, n: usize) -> usize {
        self.consumed += n;
        debug!(
            "Charged {} metric calls ({}/{})",
            n, self.consumed, self.max_metric_calls
        );
        self.consumed
    }

    /// True once consumed calls have reached the ceiling
    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.max_metric_calls
    }

    /// True if the early exit is enabled and `score` meets the threshold
    ///
    /// `skip_perfect_score` disables the exit: a run that wants to spend its
    /// whole budget regardless of score sets it to true.
    pub fn perfect_score_reached(&self, score: f64) -> bool {
        !self.skip_perfect_score && score >= self.perfect_score
    }

    /// Metric calls consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Calls remaining before the ceiling (zero once exhausted)
    pub fn remaining(&self) -> usize {
        self.max_metric_calls.saturating_sub(self.consumed)
    }

    /// The configured ceiling
    pub fn max_metric_calls(&self) -> usize {
        self.max_metric_calls
    }
}
