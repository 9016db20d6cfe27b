//! Descriptor similarity scoring.
//!
//! Two backend-specific algorithms, both reporting confidence in [0, 100].
//! The classical scorer fuses four metrics through a logistic contrast
//! stretch; the embedding scorer rescales cosine similarity, with a
//! separate mapping for the model's native verify distance.
//!
//! Scores and raw distances are different scales on purpose: each
//! conversion lives in its own function with a documented domain, and a
//! score only makes sense next to the backend tag that produced it.

use crate::types::{Backend, FaceDescriptor};

/// Fusion parameters for the classical scorer.
///
/// The weight vector and logistic constants are empirically chosen and
/// carried as configuration rather than invariants, so they can be
/// recalibrated against labeled data.
#[derive(Debug, Clone, Copy)]
pub struct ClassicalScorerParams {
    /// Component weights: cosine, correlation, Euclidean, Manhattan.
    pub weights: [f32; 4],
    /// Logistic steepness applied around the midpoint.
    pub steepness: f32,
    /// Logistic midpoint in raw-average space [0, 1].
    pub midpoint: f32,
}

impl Default for ClassicalScorerParams {
    fn default() -> Self {
        Self {
            weights: [0.4, 0.3, 0.2, 0.1],
            steepness: 10.0,
            midpoint: 0.5,
        }
    }
}

/// Cosine-distance bound under which the embedding model treats two faces
/// as the same person.
pub const EMBEDDING_VERIFY_THRESHOLD: f32 = 0.68;

/// Score at and above which a direct verification counts as a match.
/// Verified pairs never score below it, rejected pairs never reach it.
pub const VERIFY_BOUNDARY: f32 = 80.0;

fn assert_comparable(a: &FaceDescriptor, b: &FaceDescriptor, backend: Backend) {
    assert!(
        a.backend() == backend && b.backend() == backend,
        "descriptor backend mismatch: {} vs {} (scorer expects {})",
        a.backend(),
        b.backend(),
        backend,
    );
}

/// Classical multi-metric similarity in [0, 100].
///
/// Computes cosine, Pearson correlation, normalized-Euclidean, and
/// normalized-Manhattan similarities on equal-truncated-length inputs,
/// averages the available ones under `params.weights` (re-normalized over
/// what is present), and stretches the result through a logistic curve.
///
/// Panics when either descriptor is not classical or is empty: that is a
/// backend-selection bug, not bad input.
pub fn score_classical(
    a: &FaceDescriptor,
    b: &FaceDescriptor,
    params: &ClassicalScorerParams,
) -> f32 {
    assert_comparable(a, b, Backend::Classical);
    assert!(
        !a.is_empty() && !b.is_empty(),
        "cannot score an empty classical descriptor"
    );

    let len = a.len().min(b.len());
    let f1 = &a.values()[..len];
    let f2 = &b.values()[..len];

    // (similarity, weight) for each available component
    let mut components: [Option<f32>; 4] = [None; 4];

    if let Some(cos) = cosine(f1, f2) {
        components[0] = Some(cos.max(0.0));
    }
    if let Some(r) = pearson(f1, f2) {
        components[1] = Some(r.max(0.0));
    }

    let euclid: f64 = f1
        .iter()
        .zip(f2)
        .map(|(&x, &y)| ((x - y) as f64).powi(2))
        .sum::<f64>()
        .sqrt();
    let max_euclid = (len as f64).sqrt();
    components[2] = Some((1.0 - euclid / max_euclid).max(0.0) as f32);

    let manhattan: f64 = f1.iter().zip(f2).map(|(&x, &y)| ((x - y) as f64).abs()).sum();
    components[3] = Some((1.0 - manhattan / len as f64).max(0.0) as f32);

    let mut weighted = 0.0f32;
    let mut weight_sum = 0.0f32;
    for (component, &weight) in components.iter().zip(&params.weights) {
        if let Some(s) = component {
            weighted += s * weight;
            weight_sum += weight;
        }
    }
    if weight_sum == 0.0 {
        return 0.0;
    }
    let s = weighted / weight_sum;

    // Logistic contrast enhancement: stretches scores apart around the
    // midpoint so near-identical descriptors saturate toward 100 and
    // dissimilar ones collapse toward 0.
    let enhanced = 100.0 / (1.0 + (-params.steepness * (s - params.midpoint)).exp());
    enhanced.clamp(0.0, 100.0)
}

/// Embedding encoding-compare similarity in [0, 100].
///
/// Cosine similarity rescaled from [-1, 1]; orthogonal vectors land at 50.
/// A degenerate (zero-norm) input scores 0.
///
/// Panics when the descriptors are not both embeddings of equal length.
pub fn score_embedding(a: &FaceDescriptor, b: &FaceDescriptor) -> f32 {
    assert_comparable(a, b, Backend::Embedding);
    assert_eq!(
        a.len(),
        b.len(),
        "embedding dimension mismatch: {} vs {}",
        a.len(),
        b.len()
    );

    match cosine(a.values(), b.values()) {
        Some(cos) => (((cos + 1.0) / 2.0) * 100.0).clamp(0.0, 100.0),
        None => 0.0,
    }
}

/// Map the embedding model's native verify distance to a [0, 100] score.
///
/// Input domain: `distance` is a cosine distance (0 = identical), and
/// `threshold` is the model's accept bound. Verified pairs
/// (`distance <= threshold`) map into [80, 100]; rejections map into
/// [0, 79]. The [`VERIFY_BOUNDARY`] is never crossed by either branch.
pub fn verify_score(distance: f32, threshold: f32) -> f32 {
    if distance <= threshold {
        ((1.0 - distance / threshold) * 100.0).clamp(VERIFY_BOUNDARY, 100.0)
    } else {
        ((1.0 - distance) * 100.0).clamp(0.0, VERIFY_BOUNDARY - 1.0)
    }
}

/// Cosine similarity in [-1, 1]; `None` when either norm is zero.
fn cosine(f1: &[f32], f2: &[f32]) -> Option<f32> {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in f1.iter().zip(f2) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        Some((dot / denom) as f32)
    } else {
        None
    }
}

/// Pearson correlation coefficient; `None` when undefined (zero variance
/// or fewer than two samples).
fn pearson(f1: &[f32], f2: &[f32]) -> Option<f32> {
    let n = f1.len();
    if n < 2 {
        return None;
    }

    let mean_a: f64 = f1.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let mean_b: f64 = f2.iter().map(|&v| v as f64).sum::<f64>() / n as f64;

    let mut cov = 0.0f64;
    let mut var_a = 0.0f64;
    let mut var_b = 0.0f64;
    for (&x, &y) in f1.iter().zip(f2) {
        let da = x as f64 - mean_a;
        let db = y as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 {
        Some((cov / denom) as f32)
    } else {
        None
    }
}
