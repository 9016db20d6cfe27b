//! Best-match search over a candidate set.
//!
//! A single linear scan: registries are small enough that no index or
//! early termination is warranted. Candidates are scored independently,
//! so callers may shard the set across workers if they ever need to.

use crate::scorer::{self, ClassicalScorerParams};
use crate::types::{Backend, FaceDescriptor, MatchResult};

/// Strategy seam between search and the backend-specific scoring math.
pub trait Scorer {
    fn backend(&self) -> Backend;
    /// Similarity in [0, 100]. Panics on a backend-tag mismatch.
    fn score(&self, query: &FaceDescriptor, candidate: &FaceDescriptor) -> f32;
}

/// Multi-metric scorer for the classical backend.
pub struct ClassicalScorer {
    pub params: ClassicalScorerParams,
}

impl Scorer for ClassicalScorer {
    fn backend(&self) -> Backend {
        Backend::Classical
    }

    fn score(&self, query: &FaceDescriptor, candidate: &FaceDescriptor) -> f32 {
        scorer::score_classical(query, candidate, &self.params)
    }
}

/// Cosine scorer for the embedding backend (encoding-compare mode).
pub struct EmbeddingScorer;

impl Scorer for EmbeddingScorer {
    fn backend(&self) -> Backend {
        Backend::Embedding
    }

    fn score(&self, query: &FaceDescriptor, candidate: &FaceDescriptor) -> f32 {
        scorer::score_embedding(query, candidate)
    }
}

/// Scan every candidate once and return the highest-scoring one at or above
/// `threshold`. Ties keep the first candidate in scan order. When nothing
/// clears the threshold the answer is `None`: "not in the registry" is a
/// silence, not a low-confidence guess.
pub fn search(
    scorer: &dyn Scorer,
    query: &FaceDescriptor,
    candidates: &[(String, FaceDescriptor)],
    threshold: f32,
) -> Option<MatchResult> {
    let mut best: Option<(usize, f32)> = None;

    for (i, (_, descriptor)) in candidates.iter().enumerate() {
        let score = scorer.score(query, descriptor);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((i, score)),
        }
    }

    match best {
        Some((idx, score)) if score >= threshold => Some(MatchResult {
            identity_id: candidates[idx].0.clone(),
            score,
            backend: scorer.backend(),
        }),
        _ => None,
    }
}
