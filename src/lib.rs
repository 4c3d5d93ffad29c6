//! # GEPA
//!
//! Reflective prompt optimization for LLM system prompts in Rust. GEPA
//! iteratively improves a candidate prompt against a scored task set: it
//! evaluates a minibatch with traces, turns the results into per-example
//! feedback, asks a reflection model to rewrite the prompt, and accepts the
//! mutation only if it improves the full validation score, all under a
//! metric-call budget.
//!
//! ## Core Components
//!
//! - **Adapter**: caller-supplied glue that runs candidates against one task
//!   domain and builds reflective feedback
//! - **Candidate store**: append-only population with lineage and best
//!   tracking
//! - **Reflection**: prompt formatting and the reflection-model seam
//! - **Engine**: the budgeted accept/reject loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gepa::{
//!     Candidate, DefaultAdapter, GepaConfig, GepaOptimizer, LmClient, LmConfig, TaskInstance,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let lm = LmClient::new(LmConfig::new(
//!         "https://api.openai.com/v1",
//!         "your-api-key",
//!         "gpt-4o-mini",
//!     ))?;
//!
//!     let trainset = vec![
//!         TaskInstance::new(
//!             "Summarize this quarter's sales numbers.",
//!             "provide a concise summary with the key figures",
//!         ),
//!         // ...
//!     ];
//!     let valset = trainset.clone();
//!
//!     let mut optimizer = GepaOptimizer::new(
//!         DefaultAdapter::new(lm.clone()),
//!         lm,
//!         GepaConfig::new(100).with_seed(42),
//!     );
//!
//!     let result = optimizer
//!         .run(
//!             Candidate::single("system_prompt", "You are a helpful assistant."),
//!             &trainset,
//!             &valset,
//!         )
//!         .await?;
//!
//!     println!("best score: {:.3}", result.best_score);
//!     println!("{}", result.best_candidate.component("system_prompt").unwrap());
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod adapters;
pub mod budget;
pub mod candidate;
pub mod error;
pub mod lm;
pub mod optimizer;
pub mod reflection;
pub mod sampler;

// Re-export main types for convenience
pub use adapter::{Adapter, EvaluationBatch, ExampleOutcome, FAILURE_SCORE};
pub use adapters::{DefaultAdapter, TaskInstance};
pub use budget::MetricBudget;
pub use candidate::{Candidate, CandidateEntry, CandidateId, CandidateStore};
pub use error::{GepaError, GepaResult};
pub use lm::{ChatMessage, ChatModel, LmClient, LmConfig};
pub use optimizer::{GepaConfig, GepaOptimizer, IterationOutcome, OptimizationResult};
pub use reflection::{
    build_reflection_prompt, propose_component, FnReflectionModel, ReflectionModel,
    ReflectiveRecord,
};
pub use sampler::{MinibatchSampler, RoundRobinSampler, ShuffledSampler};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the default INFO level
pub fn init_logging() -> GepaResult<()> {
    init_logging_with_level(tracing::Level::INFO)
}

/// Initialize logging with a specific level
///
/// `RUST_LOG` takes precedence over the given level when set.
pub fn init_logging_with_level(level: tracing::Level) -> GepaResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(env_filter)
        .try_init()
        .map_err(|e| {
            GepaError::configuration("logging", &format!("failed to initialize logging: {}", e))
        })?;

    Ok(())
}
