//! The GEPA optimization engine
//!
//! Single-threaded hill-climbing loop: evaluate a minibatch with traces,
//! build reflective feedback, ask the reflection model to rewrite the
//! component(s), score the mutation on the full validation set, and accept it
//! only on strict improvement. Runs until the metric-call budget is exhausted
//! or an accepted candidate reaches the perfect score.

use crate::adapter::Adapter;
use crate::budget::MetricBudget;
use crate::candidate::{Candidate, CandidateId, CandidateStore};
use crate::error::{GepaError, GepaResult};
use crate::reflection::{propose_component, ReflectionModel};
use crate::sampler::{MinibatchSampler, ShuffledSampler};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for one optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GepaConfig {
    /// Ceiling on metric calls (one call = one task example evaluated)
    pub max_metric_calls: usize,
    /// Examples drawn from the training set per reflection minibatch
    pub reflection_minibatch_size: usize,
    /// Score treated as perfect for the early exit
    pub perfect_score: f64,
    /// Disable the perfect-score early exit
    pub skip_perfect_score: bool,
    /// Seed for the engine-owned RNG (minibatch sampling)
    pub seed: u64,
    /// Directory for run artifacts (best candidate + history), if any
    pub run_dir: Option<PathBuf>,
    /// Show a progress bar over the metric-call budget
    pub display_progress_bar: bool,
    /// Components to mutate each iteration; empty means all of the seed's
    pub components_to_update: Vec<String>,
}

impl GepaConfig {
    /// Create a config with the given budget and defaults everywhere else
    pub fn new(max_metric_calls: usize) -> Self {
        Self {
            max_metric_calls,
            reflection_minibatch_size: 3,
            perfect_score: 1.0,
            skip_perfect_score: false,
            seed: 0,
            run_dir: None,
            display_progress_bar: false,
            components_to_update: Vec::new(),
        }
    }

    /// Set the reflection minibatch size
    pub fn with_minibatch_size(mut self, size: usize) -> Self {
        self.reflection_minibatch_size = size;
        self
    }

    /// Set the perfect score threshold
    pub fn with_perfect_score(mut self, score: f64) -> Self {
        self.perfect_score = score;
        self
    }

    /// Disable or enable the perfect-score early exit
    pub fn with_skip_perfect_score(mut self, skip: bool) -> Self {
        self.skip_perfect_score = skip;
        self
    }

    /// Set the RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Persist run artifacts under a directory
    pub fn with_run_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.run_dir = Some(dir.into());
        self
    }

    /// Show a progress bar over the metric-call budget
    pub fn with_progress_bar(mut self, display: bool) -> Self {
        self.display_progress_bar = display;
        self
    }

    /// Restrict mutation to specific components
    pub fn with_components(mut self, components: Vec<String>) -> Self {
        self.components_to_update = components;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> GepaResult<()> {
        if self.max_metric_calls == 0 {
            return Err(GepaError::configuration(
                "max_metric_calls",
                "must be greater than 0",
            ));
        }
        if self.reflection_minibatch_size == 0 {
            return Err(GepaError::configuration(
                "reflection_minibatch_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Record of one engine iteration, kept for audit and persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationOutcome {
    /// 1-based iteration number
    pub iteration: usize,
    /// Candidate the mutation descended from
    pub parent_id: CandidateId,
    /// Id of the recorded child candidate, `None` if reflection failed
    pub candidate_id: Option<CandidateId>,
    /// Aggregate minibatch score observed for the parent
    pub minibatch_score: f64,
    /// Full validation score of the child, `None` if never evaluated
    pub validation_score: Option<f64>,
    /// Whether the child was accepted
    pub accepted: bool,
    /// Why the iteration produced no accepted candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Metric calls consumed after this iteration
    pub metric_calls_after: usize,
}

/// Final result of an optimization run
///
/// All fields are always present; callers never probe for attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// The best candidate found (the seed if nothing was accepted)
    pub best_candidate: Candidate,
    /// Validation score of the best candidate
    pub best_score: f64,
    /// Per-iteration accept/reject history
    pub history: Vec<IterationOutcome>,
    /// Total metric calls consumed, including the baseline evaluation
    pub total_metric_calls: usize,
    /// Candidates recorded in the population (accepted and rejected)
    pub num_candidates: usize,
}

/// JSON-serializable summary persisted to the run directory
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunSummary {
    run_id: Uuid,
    completed_at: chrono::DateTime<chrono::Utc>,
    seed: u64,
    sampler: String,
    best_score: f64,
    total_metric_calls: usize,
    num_candidates: usize,
    history: Vec<IterationOutcome>,
}

/// The optimization engine
///
/// Owns all mutable run state; the adapter and reflection model are pure
/// collaborators from the engine's point of view.
pub struct GepaOptimizer<A: Adapter, R: ReflectionModel> {
    adapter: A,
    reflection: R,
    config: GepaConfig,
    sampler: Box<dyn MinibatchSampler>,
}

impl<A: Adapter, R: ReflectionModel> GepaOptimizer<A, R> {
    /// Create an optimizer with the default shuffled minibatch sampler
    pub fn new(adapter: A, reflection: R, config: GepaConfig) -> Self {
        Self {
            adapter,
            reflection,
            config,
            sampler: Box::new(ShuffledSampler::new()),
        }
    }

    /// Replace the minibatch sampling strategy
    pub fn with_sampler(mut self, sampler: Box<dyn MinibatchSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// The optimizer's configuration
    pub fn config(&self) -> &GepaConfig {
        &self.config
    }

    /// Run the optimization loop
    ///
    /// Configuration errors are raised before any metric call is spent.
    /// Budget exhaustion is normal termination: the result always carries the
    /// best candidate seen, which is the seed if no mutation was accepted.
    pub async fn run(
        &mut self,
        seed_candidate: Candidate,
        trainset: &[A::Task],
        valset: &[A::Task],
    ) -> GepaResult<OptimizationResult> {
        self.config.validate()?;
        if trainset.is_empty() {
            return Err(GepaError::configuration("trainset", "must not be empty"));
        }
        if valset.is_empty() {
            return Err(GepaError::configuration("valset", "must not be empty"));
        }
        if seed_candidate.is_empty() {
            return Err(GepaError::configuration(
                "seed_candidate",
                "must have at least one component",
            ));
        }

        let components = if self.config.components_to_update.is_empty() {
            seed_candidate.component_names()
        } else {
            self.config.components_to_update.clone()
        };
        for component in &components {
            if !seed_candidate.has_component(component) {
                return Err(GepaError::configuration(
                    "components_to_update",
                    &format!("seed candidate has no `{}` component", component),
                ));
            }
        }

        info!(
            "Starting optimization: {} train / {} val examples, budget {} metric calls, seed {}",
            trainset.len(),
            valset.len(),
            self.config.max_metric_calls,
            self.config.seed
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut budget = MetricBudget::new(
            self.config.max_metric_calls,
            self.config.perfect_score,
            self.config.skip_perfect_score,
        );
        let mut store = CandidateStore::new(seed_candidate);
        let mut history: Vec<IterationOutcome> = Vec::new();

        let progress = self.make_progress_bar();

        // Baseline: the seed's validation score anchors every accept/reject
        // decision that follows.
        let seed = store.best().candidate.clone();
        let baseline = self.adapter.evaluate(valset, &seed, false).await?;
        baseline.check_shape(valset.len(), false)?;
        budget.charge(valset.len());
        self.update_progress(&progress, &budget);

        let baseline_score = baseline.aggregate_score();
        store.record_seed_score(baseline_score);
        info!("Baseline validation score: {:.4}", baseline_score);

        if budget.perfect_score_reached(baseline_score) {
            info!("Seed candidate already at perfect score, stopping");
            return self.finish(store, history, budget, progress);
        }

        let mut iteration = 0;
        while !budget.is_exhausted() {
            iteration += 1;
            let parent_id = store.best_id();
            let parent_entry = store.best();
            let parent = parent_entry.candidate.clone();
            let parent_score = parent_entry
                .validation_score
                .unwrap_or(f64::NEG_INFINITY);

            debug!("Iteration {}: mutating candidate {}", iteration, parent_id);

            // Minibatch evaluation with traces.
            let indices = self.sampler.sample(
                &mut rng,
                trainset.len(),
                self.config.reflection_minibatch_size,
            );
            let minibatch: Vec<A::Task> =
                indices.iter().map(|&i| trainset[i].clone()).collect();

            let eval_mb = self.adapter.evaluate(&minibatch, &parent, true).await?;
            eval_mb.check_shape(minibatch.len(), true)?;
            budget.charge(minibatch.len());
            self.update_progress(&progress, &budget);
            let minibatch_score = eval_mb.aggregate_score();

            // Reflective dataset and mutation.
            let reflective = self
                .adapter
                .make_reflective_dataset(&parent, &eval_mb, &components)?;

            let mut child = parent.clone();
            let mut reflection_failure: Option<String> = None;
            for component in &components {
                let records = match reflective.get(component) {
                    Some(records) => records,
                    None => {
                        return Err(GepaError::adapter(
                            "make_reflective_dataset",
                            &format!("no reflective records returned for `{}`", component),
                        ));
                    }
                };
                let current_text = child.component(component).unwrap_or_default().to_string();
                match propose_component(&self.reflection, component, &current_text, records).await
                {
                    Ok(new_text) => {
                        child = child.with_component(component.clone(), new_text);
                    }
                    Err(e) if e.is_recoverable() => {
                        reflection_failure = Some(e.to_string());
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            if let Some(reason) = reflection_failure {
                // Mutation attempt abandoned; the minibatch budget already
                // spent stays charged.
                warn!("Iteration {}: reflection failed, skipping ({})", iteration, reason);
                history.push(IterationOutcome {
                    iteration,
                    parent_id,
                    candidate_id: None,
                    minibatch_score,
                    validation_score: None,
                    accepted: false,
                    rejection_reason: Some(reason),
                    metric_calls_after: budget.consumed(),
                });
                continue;
            }

            // Full validation of the mutated candidate.
            let eval_val = self.adapter.evaluate(valset, &child, false).await?;
            eval_val.check_shape(valset.len(), false)?;
            budget.charge(valset.len());
            self.update_progress(&progress, &budget);

            let child_score = eval_val.aggregate_score();
            let accepted = child_score > parent_score;
            let child_id = store.insert(child, parent_id, child_score, accepted);

            if accepted {
                info!(
                    "Iteration {}: accepted candidate {} ({:.4} > {:.4})",
                    iteration, child_id, child_score, parent_score
                );
            } else {
                info!(
                    "Iteration {}: rejected candidate {} ({:.4} <= {:.4})",
                    iteration, child_id, child_score, parent_score
                );
            }

            history.push(IterationOutcome {
                iteration,
                parent_id,
                candidate_id: Some(child_id),
                minibatch_score,
                validation_score: Some(child_score),
                accepted,
                rejection_reason: (!accepted).then(|| "no improvement on validation set".to_string()),
                metric_calls_after: budget.consumed(),
            });

            if accepted && budget.perfect_score_reached(child_score) {
                info!(
                    "Perfect score {:.4} reached at iteration {}, stopping early",
                    child_score, iteration
                );
                break;
            }
        }

        self.finish(store, history, budget, progress)
    }

    fn finish(
        &self,
        store: CandidateStore,
        history: Vec<IterationOutcome>,
        budget: MetricBudget,
        progress: Option<ProgressBar>,
    ) -> GepaResult<OptimizationResult> {
        if let Some(pb) = progress {
            pb.finish_with_message("optimization complete");
        }

        let best = store.best();
        let result = OptimizationResult {
            best_candidate: best.candidate.clone(),
            best_score: store.best_score(),
            history,
            total_metric_calls: budget.consumed(),
            num_candidates: store.len(),
        };

        info!(
            "Optimization finished: best score {:.4} from candidate {} after {} metric calls, {} candidates explored",
            result.best_score,
            store.best_id(),
            result.total_metric_calls,
            result.num_candidates
        );

        if let Some(dir) = &self.config.run_dir {
            self.persist(dir.clone(), &result)?;
        }

        Ok(result)
    }

    /// Write run artifacts: the best candidate (JSON plus one text file per
    /// component) and the iteration history.
    fn persist(&self, dir: PathBuf, result: &OptimizationResult) -> GepaResult<()> {
        std::fs::create_dir_all(&dir)?;

        let candidate_path = dir.join("best_candidate.json");
        std::fs::write(
            &candidate_path,
            serde_json::to_string_pretty(&result.best_candidate)?,
        )?;

        for (name, text) in result.best_candidate.iter() {
            std::fs::write(dir.join(format!("optimized_{}.txt", name)), text)?;
        }

        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            completed_at: chrono::Utc::now(),
            seed: self.config.seed,
            sampler: self.sampler.name().to_string(),
            best_score: result.best_score,
            total_metric_calls: result.total_metric_calls,
            num_candidates: result.num_candidates,
            history: result.history.clone(),
        };
        std::fs::write(
            dir.join("history.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;

        info!("Run artifacts written to {}", dir.display());
        Ok(())
    }

    fn make_progress_bar(&self) -> Option<ProgressBar> {
        if !self.config.display_progress_bar {
            return None;
        }
        let pb = ProgressBar::new(self.config.max_metric_calls as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40}] {pos}/{len} metric calls"),
        );
        pb.set_message("optimizing");
        Some(pb)
    }

    fn update_progress(&self, progress: &Option<ProgressBar>, budget: &MetricBudget) {
        if let Some(pb) = progress {
            pb.set_position(budget.consumed().min(budget.max_metric_calls()) as u64);
        }
    }
}
