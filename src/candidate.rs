//! Candidate prompts and the candidate population
//!
//! A candidate is an immutable set of named prompt components under
//! optimization. The store is the append-only population the engine grows:
//! every mutation (accepted or rejected) is recorded with its parent lineage
//! and validation score, and the best candidate id never regresses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Integer id of a candidate within a [`CandidateStore`]
pub type CandidateId = usize;

/// A named set of prompt-component texts under optimization
///
/// Components are kept in a `BTreeMap` so iteration order, serialization, and
/// reflection prompts are deterministic. A mutation never edits in place; it
/// produces a new `Candidate` via [`Candidate::with_component`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Candidate {
    components: BTreeMap<String, String>,
}

impl Candidate {
    /// Create an empty candidate
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a candidate with a single component
    pub fn single<N: Into<String>, T: Into<String>>(name: N, text: T) -> Self {
        let mut components = BTreeMap::new();
        components.insert(name.into(), text.into());
        Self { components }
    }

    /// Create a candidate from an existing component map
    pub fn from_components(components: BTreeMap<String, String>) -> Self {
        Self { components }
    }

    /// Get a component's text
    pub fn component(&self, name: &str) -> Option<&str> {
        self.components.get(name).map(|s| s.as_str())
    }

    /// Produce a copy with one component overwritten (or added)
    pub fn with_component<N: Into<String>, T: Into<String>>(&self, name: N, text: T) -> Self {
        let mut components = self.components.clone();
        components.insert(name.into(), text.into());
        Self { components }
    }

    /// Component names in deterministic order
    pub fn component_names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    /// Iterate over (name, text) pairs in deterministic order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.components.iter()
    }

    /// Check whether the candidate holds a given component
    pub fn has_component(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if the candidate has no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.components.keys().map(|k| k.as_str()).collect();
        write!(f, "Candidate[{}]", names.join(", "))
    }
}

/// One recorded candidate with lineage and outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntry {
    /// Id of this candidate (its index in the store)
    pub id: CandidateId,
    /// The candidate itself
    pub candidate: Candidate,
    /// Id of the candidate this one was derived from (`None` for the seed)
    pub parent: Option<CandidateId>,
    /// Validation score, `None` until evaluated
    pub validation_score: Option<f64>,
    /// Whether the engine accepted this candidate
    pub accepted: bool,
}

/// Append-only population of candidates with best tracking
///
/// Entries are never removed or rolled back. The best id only moves when a
/// later accepted candidate scores strictly higher than the current best:
/// ties keep the earlier candidate, so the search never oscillates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateStore {
    entries: Vec<CandidateEntry>,
    best_id: CandidateId,
}

impl CandidateStore {
    /// Create a store seeded with the initial candidate
    ///
    /// The seed is entry 0 with no parent; it is considered accepted but has
    /// no score until the engine records its baseline evaluation.
    pub fn new(seed: Candidate) -> Self {
        let entry = CandidateEntry {
            id: 0,
            candidate: seed,
            parent: None,
            validation_score: None,
            accepted: true,
        };
        Self {
            entries: vec![entry],
            best_id: 0,
        }
    }

    /// Record the seed candidate's baseline validation score
    pub fn record_seed_score(&mut self, score: f64) {
        self.entries[0].validation_score = Some(score);
        debug!("Recorded seed baseline score {:.4}", score);
    }

    /// Append a candidate to the population
    ///
    /// Accepted candidates become the new best only on a strictly higher
    /// score. Rejected candidates are kept for audit and never touch best_id.
    pub fn insert(
        &mut self,
        candidate: Candidate,
        parent: CandidateId,
        validation_score: f64,
        accepted: bool,
    ) -> CandidateId {
        let id = self.entries.len();
        self.entries.push(CandidateEntry {
            id,
            candidate,
            parent: Some(parent),
            validation_score: Some(validation_score),
            accepted,
        });

        if accepted && validation_score > self.best_score() {
            debug!(
                "Candidate {} is the new best ({:.4} > {:.4})",
                id,
                validation_score,
                self.best_score()
            );
            self.best_id = id;
        }

        id
    }

    /// Id of the best candidate seen so far
    pub fn best_id(&self) -> CandidateId {
        self.best_id
    }

    /// The best candidate entry
    pub fn best(&self) -> &CandidateEntry {
        &self.entries[self.best_id]
    }

    /// The best candidate's validation score (negative infinity if the seed
    /// has not been evaluated yet)
    pub fn best_score(&self) -> f64 {
        self.entries[self.best_id]
            .validation_score
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Look up a candidate entry by id
    pub fn get(&self, id: CandidateId) -> Option<&CandidateEntry> {
        self.entries.get(id)
    }

    /// All recorded entries in insertion order
    pub fn entries(&self) -> &[CandidateEntry] {
        &self.entries
    }

    /// Number of recorded candidates (accepted and rejected)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A store always holds at least the seed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for CandidateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CandidateStore[{} candidates, best id {} at {:.3}]",
            self.entries.len(),
            self.best_id,
            self.best_score()
        )
    }
}
