//! Reflection: turning per-example feedback into an improved prompt component
//!
//! The engine formats reflective records into a natural-language prompt, sends
//! it to the reflection model, and uses the raw response as the new component
//! text. A failed or empty reflection abandons only the current iteration.

use crate::error::{GepaError, GepaResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Per-example feedback consumed by the reflection prompt
///
/// The required fields are fixed; adapters attach any domain-specific detail
/// (expected answers, trace excerpts) through `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectiveRecord {
    /// The task inputs that produced this example
    pub inputs: Value,
    /// What the task model generated
    pub generated_output: Value,
    /// Natural-language feedback; must vary observably with score
    pub feedback: String,
    /// Metric score for this example
    pub score: f64,
    /// Adapter-defined extra fields
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl ReflectiveRecord {
    /// Create a record with the required fields
    pub fn new<F: Into<String>>(inputs: Value, generated_output: Value, feedback: F, score: f64) -> Self {
        Self {
            inputs,
            generated_output,
            feedback: feedback.into(),
            score,
            extra: HashMap::new(),
        }
    }

    /// Attach an adapter-defined extra field
    pub fn with_extra<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Format the reflection prompt for one component
///
/// Renders the current component text plus every reflective record and asks
/// the model to return only the rewritten text, so the raw response can be
/// used as the new component verbatim.
pub fn build_reflection_prompt(
    component_name: &str,
    current_text: &str,
    records: &[ReflectiveRecord],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are improving the `{}` text used by an AI assistant. Below is the \
         current text, followed by examples of how the assistant performed with \
         it and feedback on each example.\n\n",
        component_name
    ));

    prompt.push_str(&format!(
        "## Current `{}`\n\n```\n{}\n```\n\n## Examples\n\n",
        component_name, current_text
    ));

    for (i, record) in records.iter().enumerate() {
        prompt.push_str(&format!("### Example {} (score: {:.2})\n\n", i + 1, record.score));
        prompt.push_str(&format!("Inputs: {}\n", render_value(&record.inputs)));
        prompt.push_str(&format!(
            "Generated output: {}\n",
            render_value(&record.generated_output)
        ));
        prompt.push_str(&format!("Feedback: {}\n", record.feedback));
        for (key, value) in &record.extra {
            prompt.push_str(&format!("{}: {}\n", key, render_value(value)));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Rewrite the `{}` so the assistant addresses the feedback above while \
         keeping what already works. Respond with ONLY the improved text, no \
         commentary or code fences.",
        component_name
    ));

    prompt
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A model that rewrites prompt text given reflective feedback
///
/// Implemented by [`crate::lm::LmClient`] for real endpoints and by
/// [`FnReflectionModel`] for tests and custom callers.
#[async_trait]
pub trait ReflectionModel: Send + Sync {
    /// Send a reflection prompt and return the model's raw text response
    async fn reflect(&self, prompt: &str) -> GepaResult<String>;
}

/// Wrap a plain function as a reflection model
///
/// Matches the `reflection_lm: (string) -> string` surface callers expect;
/// useful for deterministic tests and offline mutation policies.
pub struct FnReflectionModel<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    f: F,
}

impl<F> FnReflectionModel<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    /// Wrap a function as a reflection model
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ReflectionModel for FnReflectionModel<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    async fn reflect(&self, prompt: &str) -> GepaResult<String> {
        Ok((self.f)(prompt))
    }
}

/// Ask the reflection model for an improved component text
///
/// An empty or whitespace-only response is an error: the engine treats it as
/// a failed mutation attempt and abandons the iteration.
pub async fn propose_component(
    model: &dyn ReflectionModel,
    component_name: &str,
    current_text: &str,
    records: &[ReflectiveRecord],
) -> GepaResult<String> {
    let prompt = build_reflection_prompt(component_name, current_text, records);
    let response = model.reflect(&prompt).await?;
    let text = response.trim();

    if text.is_empty() {
        return Err(GepaError::reflection(format!(
            "reflection model returned an empty rewrite for `{}`",
            component_name
        )));
    }

    Ok(text.to_string())
}
