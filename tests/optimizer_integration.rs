//! End-to-end tests for the optimization engine
//!
//! All LLM traffic is mocked: the adapter scores candidates from their prompt
//! text and the reflection model is a deterministic closure, so every run is
//! reproducible.

use async_trait::async_trait;
use gepa::{
    Adapter, Candidate, EvaluationBatch, ExampleOutcome, FnReflectionModel, GepaConfig,
    GepaOptimizer, GepaResult, ReflectiveRecord,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Adapter whose score is a pure function of the candidate's prompt text
///
/// Scores every example 0.5 for the seed prompt and 1.0 for any prompt
/// containing "v1", unless a custom scorer is installed.
/// Records every traced minibatch for determinism checks.
struct TextScoredAdapter {
    scorer: Box<dyn Fn(&str) -> f64 + Send + Sync>,
    traced_batches: Arc<Mutex<Vec<Vec<usize>>>>,
    evaluate_calls: Arc<AtomicUsize>,
}

impl TextScoredAdapter {
    fn scenario() -> Self {
        Self::with_scorer(|prompt| if prompt.contains("v1") { 1.0 } else { 0.5 })
    }

    fn with_scorer<F>(scorer: F) -> Self
    where
        F: Fn(&str) -> f64 + Send + Sync + 'static,
    {
        Self {
            scorer: Box::new(scorer),
            traced_batches: Arc::new(Mutex::new(Vec::new())),
            evaluate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Adapter for TextScoredAdapter {
    type Task = usize;

    async fn evaluate(
        &self,
        batch: &[usize],
        candidate: &Candidate,
        capture_traces: bool,
    ) -> GepaResult<EvaluationBatch> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        if capture_traces {
            self.traced_batches.lock().unwrap().push(batch.to_vec());
        }

        let prompt = candidate.component("system_prompt").unwrap_or_default();
        let score = (self.scorer)(prompt);

        let outcomes = batch
            .iter()
            .map(|&task| {
                if capture_traces {
                    ExampleOutcome::success_with_trace(
                        json!({ "task": task }),
                        score,
                        json!({ "task": task, "score": score }),
                    )
                } else {
                    ExampleOutcome::success(json!({ "task": task }), score)
                }
            })
            .collect();

        Ok(EvaluationBatch::from_outcomes(outcomes, capture_traces))
    }

    fn make_reflective_dataset(
        &self,
        _candidate: &Candidate,
        eval_batch: &EvaluationBatch,
        components_to_update: &[String],
    ) -> GepaResult<HashMap<String, Vec<ReflectiveRecord>>> {
        let trajectories = eval_batch.trajectories.as_ref().expect("traced batch");
        let mut dataset = HashMap::new();
        for component in components_to_update {
            let records = trajectories
                .iter()
                .zip(eval_batch.scores.iter())
                .map(|(trajectory, &score)| {
                    let feedback = if score >= 0.8 {
                        format!("Strong result on task {}", trajectory["task"])
                    } else {
                        format!("Weak result on task {}, needs rework", trajectory["task"])
                    };
                    ReflectiveRecord::new(trajectory["task"].clone(), trajectory.clone(), feedback, score)
                })
                .collect();
            dataset.insert(component.clone(), records);
        }
        Ok(dataset)
    }
}

fn trainset(n: usize) -> Vec<usize> {
    (0..n).collect()
}

/// The concrete scenario: seed "v0" scores 0.5, anything containing "v1"
/// scores 1.0, reflection always proposes "v1".
#[tokio::test]
async fn test_concrete_v0_to_v1_scenario() {
    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "v1".to_string());
    let config = GepaConfig::new(20).with_minibatch_size(2).with_seed(42);

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer
        .run(Candidate::single("system_prompt", "v0"), &trainset(4), &trainset(2))
        .await
        .unwrap();

    assert_eq!(result.best_candidate.component("system_prompt"), Some("v1"));
    assert_eq!(result.best_score, 1.0);

    // Iteration 1 consumed 2 (minibatch) + 2 (valset) on top of the
    // 2-call baseline, then the perfect score stopped the run early.
    assert_eq!(result.history.len(), 1);
    let outcome = &result.history[0];
    assert!(outcome.accepted);
    assert_eq!(outcome.validation_score, Some(1.0));
    assert_eq!(outcome.metric_calls_after, 6);
    assert_eq!(result.total_metric_calls, 6);
    assert!(result.total_metric_calls < 20);
}

#[tokio::test]
async fn test_skip_perfect_score_spends_the_whole_budget() {
    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "v1".to_string());
    let config = GepaConfig::new(20)
        .with_minibatch_size(2)
        .with_skip_perfect_score(true);

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer
        .run(Candidate::single("system_prompt", "v0"), &trainset(4), &trainset(2))
        .await
        .unwrap();

    // No early exit: the run keeps iterating (and rejecting ties) until the
    // budget is gone, but the best never moves off "v1".
    assert!(result.total_metric_calls >= 20);
    assert!(result.history.len() > 1);
    assert_eq!(result.best_candidate.component("system_prompt"), Some("v1"));
    assert!(result.history.iter().filter(|h| h.accepted).count() == 1);
}

#[tokio::test]
async fn test_budget_conservation() {
    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "no improvement".to_string());
    let config = GepaConfig::new(10).with_minibatch_size(2);

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer
        .run(Candidate::single("system_prompt", "v0"), &trainset(4), &trainset(2))
        .await
        .unwrap();

    // Baseline (2 valset calls) plus 2+2 per iteration; the soft ceiling
    // allows at most one in-flight iteration past the budget.
    let mut expected = 2;
    for outcome in &result.history {
        expected += 2 + if outcome.validation_score.is_some() { 2 } else { 0 };
        assert_eq!(outcome.metric_calls_after, expected);
    }
    assert_eq!(result.total_metric_calls, expected);
    assert!(result.total_metric_calls >= 10);
    assert!(result.total_metric_calls < 10 + 4);
}

#[tokio::test]
async fn test_monotonic_best_score() {
    // Each reflection proposes a strictly better prompt: score is parsed
    // from the version number.
    let version = AtomicUsize::new(0);
    let reflection = FnReflectionModel::new(move |_prompt: &str| {
        let v = version.fetch_add(1, Ordering::SeqCst) + 1;
        format!("v{}", v)
    });
    let adapter = TextScoredAdapter::with_scorer(|prompt| {
        let v: f64 = prompt.trim_start_matches('v').parse().unwrap_or(0.0);
        (v * 0.1).min(0.9)
    });
    let config = GepaConfig::new(30)
        .with_minibatch_size(2)
        .with_skip_perfect_score(true);

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer
        .run(Candidate::single("system_prompt", "v0"), &trainset(4), &trainset(2))
        .await
        .unwrap();

    let mut best_so_far = f64::NEG_INFINITY;
    for outcome in &result.history {
        if outcome.accepted {
            let score = outcome.validation_score.unwrap();
            assert!(score > best_so_far, "accepted candidate regressed the best score");
            best_so_far = score;
        }
    }
    assert!(result.best_score >= best_so_far);
    assert!(result.history.iter().any(|h| h.accepted));
}

#[tokio::test]
async fn test_determinism_across_runs() {
    async fn one_run() -> (String, Vec<Vec<usize>>) {
        let adapter = TextScoredAdapter::scenario();
        let batches = Arc::clone(&adapter.traced_batches);
        let reflection = FnReflectionModel::new(|_prompt: &str| "still v0 quality".to_string());
        let config = GepaConfig::new(14).with_minibatch_size(2).with_seed(7);

        let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
        let result = optimizer
            .run(Candidate::single("system_prompt", "v0"), &trainset(6), &trainset(2))
            .await
            .unwrap();

        let history = serde_json::to_string(&result.history).unwrap();
        let batches = batches.lock().unwrap().clone();
        (history, batches)
    }

    let (history_a, batches_a) = one_run().await;
    let (history_b, batches_b) = one_run().await;

    assert_eq!(history_a, history_b);
    assert_eq!(batches_a, batches_b);
}

#[tokio::test]
async fn test_seed_changes_minibatch_composition() {
    async fn batches_for(seed: u64) -> Vec<Vec<usize>> {
        let adapter = TextScoredAdapter::scenario();
        let batches = Arc::clone(&adapter.traced_batches);
        let reflection = FnReflectionModel::new(|_prompt: &str| "nothing new".to_string());
        let config = GepaConfig::new(14).with_minibatch_size(2).with_seed(seed);

        let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
        optimizer
            .run(Candidate::single("system_prompt", "v0"), &trainset(8), &trainset(2))
            .await
            .unwrap();
        let batches = batches.lock().unwrap().clone();
        batches
    }

    let a = batches_for(1).await;
    let b = batches_for(2).await;
    let c = batches_for(3).await;
    assert!(a != b || b != c, "different seeds drew identical minibatches");
}

#[tokio::test]
async fn test_reflection_failure_abandons_iteration_but_not_run() {
    let adapter = TextScoredAdapter::scenario();
    // Empty rewrite: every mutation attempt fails.
    let reflection = FnReflectionModel::new(|_prompt: &str| String::new());
    let config = GepaConfig::new(10).with_minibatch_size(2);

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer
        .run(Candidate::single("system_prompt", "v0"), &trainset(4), &trainset(2))
        .await
        .unwrap();

    // Every iteration was abandoned after its minibatch: no candidate ids,
    // no valset charges, budget still consumed for the minibatches.
    assert!(!result.history.is_empty());
    for outcome in &result.history {
        assert_eq!(outcome.candidate_id, None);
        assert!(!outcome.accepted);
        assert!(outcome.rejection_reason.is_some());
    }
    assert_eq!(result.best_candidate.component("system_prompt"), Some("v0"));
    assert_eq!(result.best_score, 0.5);
    assert_eq!(result.num_candidates, 1);
    // Baseline 2 + four 2-call minibatches.
    assert_eq!(result.total_metric_calls, 10);
}

#[tokio::test]
async fn test_configuration_errors_are_fatal_and_spend_nothing() {
    let empty: Vec<usize> = Vec::new();

    let adapter = TextScoredAdapter::scenario();
    let calls = Arc::clone(&adapter.evaluate_calls);
    let reflection = FnReflectionModel::new(|_prompt: &str| "v1".to_string());
    let mut optimizer = GepaOptimizer::new(adapter, reflection, GepaConfig::new(10));

    let seed = Candidate::single("system_prompt", "v0");

    let error = optimizer.run(seed.clone(), &empty, &trainset(2)).await.unwrap_err();
    assert_eq!(error.category(), "configuration");

    let error = optimizer.run(seed.clone(), &trainset(2), &empty).await.unwrap_err();
    assert_eq!(error.category(), "configuration");

    let error = optimizer.run(Candidate::new(), &trainset(2), &trainset(2)).await.unwrap_err();
    assert_eq!(error.category(), "configuration");

    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "v1".to_string());
    let mut optimizer = GepaOptimizer::new(adapter, reflection, GepaConfig::new(0));
    let error = optimizer.run(seed.clone(), &trainset(2), &trainset(2)).await.unwrap_err();
    assert_eq!(error.category(), "configuration");

    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "v1".to_string());
    let config = GepaConfig::new(10).with_components(vec!["missing".to_string()]);
    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let error = optimizer.run(seed, &trainset(2), &trainset(2)).await.unwrap_err();
    assert_eq!(error.category(), "configuration");
}

#[tokio::test]
async fn test_budget_exhaustion_returns_seed_when_nothing_accepted() {
    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "worse prompt".to_string());
    let config = GepaConfig::new(8).with_minibatch_size(2);

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer
        .run(Candidate::single("system_prompt", "v0"), &trainset(4), &trainset(2))
        .await
        .unwrap();

    assert_eq!(result.best_candidate.component("system_prompt"), Some("v0"));
    assert_eq!(result.best_score, 0.5);
    assert!(result.history.iter().all(|h| !h.accepted));
}

#[tokio::test]
async fn test_run_dir_artifacts() {
    let dir = tempfile::TempDir::new().unwrap();

    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "v1".to_string());
    let config = GepaConfig::new(20)
        .with_minibatch_size(2)
        .with_run_dir(dir.path().join("run"));

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer
        .run(Candidate::single("system_prompt", "v0"), &trainset(4), &trainset(2))
        .await
        .unwrap();

    let run = dir.path().join("run");

    let candidate: Candidate =
        serde_json::from_str(&std::fs::read_to_string(run.join("best_candidate.json")).unwrap())
            .unwrap();
    assert_eq!(candidate, result.best_candidate);

    let prompt = std::fs::read_to_string(run.join("optimized_system_prompt.txt")).unwrap();
    assert_eq!(prompt, "v1");

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run.join("history.json")).unwrap()).unwrap();
    assert_eq!(summary["best_score"], 1.0);
    assert_eq!(summary["total_metric_calls"], 6);
    assert!(summary["history"].as_array().unwrap().len() == 1);
}

#[tokio::test]
async fn test_multi_component_candidates_mutate_all_components() {
    let adapter = TextScoredAdapter::scenario();
    let reflection = FnReflectionModel::new(|_prompt: &str| "v1".to_string());
    let config = GepaConfig::new(20).with_minibatch_size(2);

    let seed = Candidate::new()
        .with_component("system_prompt", "v0")
        .with_component("tool_description", "use tools wisely");

    let mut optimizer = GepaOptimizer::new(adapter, reflection, config);
    let result = optimizer.run(seed, &trainset(4), &trainset(2)).await.unwrap();

    // Both components were rewritten by the reflection model.
    assert_eq!(result.best_candidate.component("system_prompt"), Some("v1"));
    assert_eq!(result.best_candidate.component("tool_description"), Some("v1"));
}
