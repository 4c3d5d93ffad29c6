//! Adapter contract between the optimizer and a concrete task domain
//!
//! An adapter is the caller-supplied glue that runs a candidate prompt against
//! task records and turns the results into reflective feedback. The engine
//! only depends on the two operations here; everything domain-specific
//! (model calls, scoring, feedback wording) lives behind this trait.

use crate::candidate::Candidate;
use crate::error::{GepaError, GepaResult};
use crate::reflection::ReflectiveRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Sentinel score assigned to examples whose model call failed
pub const FAILURE_SCORE: f64 = 0.0;

/// Outcome of evaluating one task example
///
/// Per-example failures are modeled as data, not exceptions: the projection to
/// a sentinel-scored batch entry happens in
/// [`EvaluationBatch::from_outcomes`], so the isolate-and-continue contract is
/// a visible, testable transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExampleOutcome {
    /// The model call succeeded and was scored
    Success {
        /// Raw output for this example
        output: Value,
        /// Metric score, higher is better
        score: f64,
        /// Execution trace, present when the caller requested traces
        trajectory: Option<Value>,
    },
    /// The model call failed; the error message stands in for the output
    Failure {
        /// Error message from the underlying call
        error: String,
    },
}

impl ExampleOutcome {
    /// Create a successful outcome without a trace
    pub fn success(output: Value, score: f64) -> Self {
        Self::Success {
            output,
            score,
            trajectory: None,
        }
    }

    /// Create a successful outcome with a trace
    pub fn success_with_trace(output: Value, score: f64, trajectory: Value) -> Self {
        Self::Success {
            output,
            score,
            trajectory: Some(trajectory),
        }
    }

    /// Create a failed outcome
    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Score of this outcome (the sentinel for failures)
    pub fn score(&self) -> f64 {
        match self {
            Self::Success { score, .. } => *score,
            Self::Failure { .. } => FAILURE_SCORE,
        }
    }
}

/// Per-example outputs, scores, and optional traces for one evaluated batch
///
/// Invariant: `outputs`, `scores`, and (when present) `trajectories` all have
/// exactly one entry per input, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationBatch {
    /// One output per evaluated example
    pub outputs: Vec<Value>,
    /// One score per evaluated example, higher is better
    pub scores: Vec<f64>,
    /// One trace per example, `None` unless traces were requested
    pub trajectories: Option<Vec<Value>>,
}

impl EvaluationBatch {
    /// Create a batch without traces
    pub fn new(outputs: Vec<Value>, scores: Vec<f64>) -> Self {
        Self {
            outputs,
            scores,
            trajectories: None,
        }
    }

    /// Attach traces to a batch
    pub fn with_trajectories(mut self, trajectories: Vec<Value>) -> Self {
        self.trajectories = Some(trajectories);
        self
    }

    /// Project per-example outcomes into a complete batch
    ///
    /// Failures become `{"error": ...}` outputs scored at [`FAILURE_SCORE`];
    /// when traces were requested, failed examples get an error trace so the
    /// batch stays same-length in every column.
    pub fn from_outcomes(outcomes: Vec<ExampleOutcome>, capture_traces: bool) -> Self {
        let mut outputs = Vec::with_capacity(outcomes.len());
        let mut scores = Vec::with_capacity(outcomes.len());
        let mut trajectories = if capture_traces {
            Some(Vec::with_capacity(outcomes.len()))
        } else {
            None
        };

        for outcome in outcomes {
            match outcome {
                ExampleOutcome::Success {
                    output,
                    score,
                    trajectory,
                } => {
                    outputs.push(output);
                    scores.push(score);
                    if let Some(traces) = trajectories.as_mut() {
                        traces.push(trajectory.unwrap_or(Value::Null));
                    }
                }
                ExampleOutcome::Failure { error } => {
                    let payload = json!({ "error": error });
                    if let Some(traces) = trajectories.as_mut() {
                        traces.push(payload.clone());
                    }
                    outputs.push(payload);
                    scores.push(FAILURE_SCORE);
                }
            }
        }

        Self {
            outputs,
            scores,
            trajectories,
        }
    }

    /// Verify the same-length/same-order invariant against the input batch
    pub fn check_shape(&self, expected_len: usize, expect_traces: bool) -> GepaResult<()> {
        if self.outputs.len() != expected_len || self.scores.len() != expected_len {
            return Err(GepaError::adapter(
                "evaluate",
                &format!(
                    "batch shape mismatch: {} inputs but {} outputs / {} scores",
                    expected_len,
                    self.outputs.len(),
                    self.scores.len()
                ),
            ));
        }

        match (&self.trajectories, expect_traces) {
            (Some(traces), true) => {
                if traces.len() != expected_len {
                    return Err(GepaError::adapter(
                        "evaluate",
                        &format!(
                            "batch shape mismatch: {} inputs but {} trajectories",
                            expected_len,
                            traces.len()
                        ),
                    ));
                }
            }
            (None, true) => {
                return Err(GepaError::adapter(
                    "evaluate",
                    "traces were requested but the adapter returned none",
                ));
            }
            _ => {}
        }

        Ok(())
    }

    /// Aggregate score for the batch (mean of per-example scores)
    pub fn aggregate_score(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }

    /// Number of evaluated examples
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Domain-specific glue between the optimizer and a task model
///
/// Implementations run candidate prompts against task records and build the
/// reflective feedback the mutation step consumes. `evaluate` must return one
/// output/score pair per input in input order, isolating per-example failures
/// at the sentinel score instead of aborting the batch.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Opaque task record type supplied by the caller's dataset
    type Task: Clone + Send + Sync;

    /// Evaluate a candidate on a batch of tasks
    ///
    /// When `capture_traces` is true the returned batch carries one trace per
    /// example; the reflective dataset builder requires those traces.
    async fn evaluate(
        &self,
        batch: &[Self::Task],
        candidate: &Candidate,
        capture_traces: bool,
    ) -> GepaResult<EvaluationBatch>;

    /// Build per-component reflective records from a traced evaluation
    ///
    /// `eval_batch` must come from a prior `evaluate(.., capture_traces=true)`
    /// on the same candidate. Returns one record list per entry in
    /// `components_to_update`. Feedback text must vary with score; a constant
    /// string gives the reflection model nothing to learn from.
    fn make_reflective_dataset(
        &self,
        candidate: &Candidate,
        eval_batch: &EvaluationBatch,
        components_to_update: &[String],
    ) -> GepaResult<HashMap<String, Vec<ReflectiveRecord>>>;
}
