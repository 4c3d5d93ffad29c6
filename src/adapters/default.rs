//! Default adapter: single-turn chat tasks with keyword scoring
//!
//! Evaluates `(input, answer)` task records by sending the candidate's system
//! prompt plus the task input to a chat model and scoring the response with a
//! keyword heuristic. Suitable for agent-prompt tuning where the expected
//! behavior is described in prose rather than an exact answer string.

use crate::adapter::{Adapter, EvaluationBatch, ExampleOutcome};
use crate::candidate::Candidate;
use crate::error::{GepaError, GepaResult};
use crate::lm::{ChatMessage, ChatModel};
use crate::reflection::ReflectiveRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

/// Words that indicate the response shows structured planning
const PLANNING_WORDS: [&str; 3] = ["plan", "step", "analyze"];

/// One labeled task: an input and a description of the expected behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    /// The user request given to the model
    pub input: String,
    /// Expected behavior, matched as a lowercase substring of the response
    pub answer: String,
    /// Free-form context carried along with the task
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_context: HashMap<String, Value>,
}

impl TaskInstance {
    /// Create a task from an input and its expected behavior
    pub fn new<I: Into<String>, A: Into<String>>(input: I, answer: A) -> Self {
        Self {
            input: input.into(),
            answer: answer.into(),
            additional_context: HashMap::new(),
        }
    }

    /// Attach a context entry
    pub fn with_context<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.additional_context.insert(key.into(), value.into());
        self
    }
}

/// Adapter that optimizes one system-prompt component for a chat model
pub struct DefaultAdapter<M: ChatModel> {
    model: M,
    component: String,
    tool_keyword: Option<String>,
}

impl<M: ChatModel> DefaultAdapter<M> {
    /// Create an adapter optimizing the `system_prompt` component
    pub fn new(model: M) -> Self {
        Self {
            model,
            component: "system_prompt".to_string(),
            tool_keyword: None,
        }
    }

    /// Optimize a differently-named component
    pub fn with_component<S: Into<String>>(mut self, component: S) -> Self {
        self.component = component.into();
        self
    }

    /// Reward responses that mention a required tool, and remind the
    /// reflection model when they don't
    pub fn with_tool_keyword<S: Into<String>>(mut self, keyword: S) -> Self {
        self.tool_keyword = Some(keyword.into());
        self
    }

    /// The component name this adapter optimizes
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Score a response against the task's expected behavior
    ///
    /// Expected-behavior substring match carries half the weight; response
    /// length, tool mention, and planning vocabulary make up the rest.
    pub fn score_response(&self, task: &TaskInstance, response: &str) -> f64 {
        let expected = task.answer.to_lowercase();
        let response_lower = response.to_lowercase();

        let mut score: f64 = 0.0;

        if response_lower.contains(&expected) {
            score += 0.5;
        }
        if response.len() >= 50 {
            score += 0.2;
        }
        if let Some(keyword) = &self.tool_keyword {
            if response_lower.contains(&keyword.to_lowercase()) {
                score += 0.2;
            }
        }
        if PLANNING_WORDS.iter().any(|w| response_lower.contains(w)) {
            score += 0.1;
        }

        score.min(1.0)
    }

    fn feedback_for(&self, task: &TaskInstance, response: &str, score: f64) -> String {
        let mut feedback = if score >= 0.8 {
            format!(
                "Excellent response. The assistant was expected to {} and delivered it with good structure.",
                task.answer
            )
        } else if score >= 0.5 {
            format!(
                "Good response but could be improved. The assistant should better {} and show more structured thinking.",
                task.answer
            )
        } else {
            format!(
                "Poor response. The assistant failed to {}. It needs a clearer understanding of the task requirements and a more systematic approach.",
                task.answer
            )
        };

        if let Some(keyword) = &self.tool_keyword {
            if !response.to_lowercase().contains(&keyword.to_lowercase()) {
                feedback.push_str(&format!(
                    " Remember to use the {} tool for communication.",
                    keyword
                ));
            }
        }

        if score < 0.3 {
            feedback.push_str(&format!(" Expected behavior: {}", task.answer));
        }

        feedback
    }

    fn system_prompt<'a>(&self, candidate: &'a Candidate) -> GepaResult<&'a str> {
        candidate.component(&self.component).ok_or_else(|| {
            GepaError::adapter(
                "evaluate",
                &format!("candidate is missing the `{}` component", self.component),
            )
        })
    }
}

#[async_trait]
impl<M: ChatModel> Adapter for DefaultAdapter<M> {
    type Task = TaskInstance;

    async fn evaluate(
        &self,
        batch: &[TaskInstance],
        candidate: &Candidate,
        capture_traces: bool,
    ) -> GepaResult<EvaluationBatch> {
        let system_prompt = self.system_prompt(candidate)?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for task in batch {
            let messages = [
                ChatMessage::system(system_prompt),
                ChatMessage::user(&task.input),
            ];

            match self.model.complete(&messages).await {
                Ok(response) => {
                    let response = response.trim().to_string();
                    let score = self.score_response(task, &response);
                    let output = json!({ "response": response });

                    if capture_traces {
                        let trajectory = json!({
                            "input": task.input,
                            "expected": task.answer,
                            "response": response,
                            "score": score,
                        });
                        outcomes.push(ExampleOutcome::success_with_trace(output, score, trajectory));
                    } else {
                        outcomes.push(ExampleOutcome::success(output, score));
                    }
                }
                Err(e) => {
                    // Isolate-and-continue: one failing example must not
                    // abort the batch.
                    warn!("Task evaluation failed, scoring at sentinel: {}", e);
                    outcomes.push(ExampleOutcome::failure(e.to_string()));
                }
            }
        }

        Ok(EvaluationBatch::from_outcomes(outcomes, capture_traces))
    }

    fn make_reflective_dataset(
        &self,
        _candidate: &Candidate,
        eval_batch: &EvaluationBatch,
        components_to_update: &[String],
    ) -> GepaResult<HashMap<String, Vec<ReflectiveRecord>>> {
        let trajectories = eval_batch.trajectories.as_ref().ok_or_else(|| {
            GepaError::adapter(
                "make_reflective_dataset",
                "evaluation batch has no trajectories; evaluate with capture_traces=true first",
            )
        })?;

        let mut dataset = HashMap::new();

        for component in components_to_update {
            if component != &self.component {
                return Err(GepaError::adapter(
                    "make_reflective_dataset",
                    &format!("this adapter only optimizes `{}`", self.component),
                ));
            }

            let mut records = Vec::with_capacity(trajectories.len());
            for (trajectory, (score, output)) in trajectories
                .iter()
                .zip(eval_batch.scores.iter().zip(eval_batch.outputs.iter()))
            {
                let task = TaskInstance::new(
                    trajectory
                        .get("input")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default(),
                    trajectory
                        .get("expected")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default(),
                );
                let response = trajectory
                    .get("response")
                    .and_then(|v| v.as_str())
                    .or_else(|| trajectory.get("error").and_then(|v| v.as_str()))
                    .unwrap_or_default();

                let feedback = self.feedback_for(&task, response, *score);
                records.push(
                    ReflectiveRecord::new(json!(task.input), output.clone(), feedback, *score)
                        .with_extra("Expected", json!(task.answer)),
                );
            }
            dataset.insert(component.clone(), records);
        }

        Ok(dataset)
    }
}
