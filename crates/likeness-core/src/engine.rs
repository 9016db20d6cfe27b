//! The matching engine: a process-wide, immutable backend choice behind a
//! uniform capability surface.
//!
//! `MatchingEngine::probe` runs once at startup. It prefers the embedding
//! backend when its model runtime is present, falls back to the classical
//! backend when a face detector is usable, and otherwise yields a disabled
//! engine whose operations all answer `None`. The choice is never
//! re-evaluated: descriptors from different backends are not comparable,
//! and re-probing per call could flip state mid-session.
//!
//! Expected failures — no face, undecodable bytes, unavailable backend —
//! surface as `None` plus a tracing event. Panics are reserved for
//! contract violations such as cross-backend comparison.

use std::path::PathBuf;

use crate::embedder::{EmbeddingExtractor, EMBEDDING_MODEL_NAME};
use crate::features;
use crate::localizer::Localizer;
use crate::scorer::{
    self, ClassicalScorerParams, EMBEDDING_VERIFY_THRESHOLD, VERIFY_BOUNDARY,
};
use crate::search::{self, ClassicalScorer, EmbeddingScorer, Scorer};
use crate::types::{Backend, FaceDescriptor, ImageSource, MatchResult};

/// Default location for model artifacts.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("likeness")
        .join("models")
}

/// Engine construction parameters. Defaults mirror the deployed constants;
/// the scorer parameters are deliberately configurable (see
/// [`ClassicalScorerParams`]).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding model files (detector, cascade, embedding).
    pub model_dir: PathBuf,
    /// Permit the one-time detector model download on first use.
    pub allow_download: bool,
    /// Primary detector confidence bar; boxes at or below are discarded.
    pub detector_confidence: f32,
    /// Acceptance threshold for classical-backend search.
    pub classical_threshold: f32,
    /// Acceptance threshold for embedding-backend search.
    pub embedding_threshold: f32,
    pub scorer_params: ClassicalScorerParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            allow_download: true,
            detector_confidence: 0.5,
            classical_threshold: 70.0,
            embedding_threshold: 90.0,
            scorer_params: ClassicalScorerParams::default(),
        }
    }
}

/// Two-image comparison outcome, on the producing backend's scale.
#[derive(Debug, Clone)]
pub struct Verification {
    pub score: f32,
    pub matched: bool,
    pub backend: Backend,
}

enum Pipeline {
    Embedding {
        localizer: Localizer,
        embedder: EmbeddingExtractor,
    },
    Classical {
        localizer: Localizer,
    },
    Disabled,
}

/// The engine instance. Construct once via [`MatchingEngine::probe`] and
/// pass to call sites; the backend selection is immutable for the
/// process's lifetime.
pub struct MatchingEngine {
    pipeline: Pipeline,
    scorer_params: ClassicalScorerParams,
    classical_threshold: f32,
    embedding_threshold: f32,
}

impl MatchingEngine {
    /// Probe available backends and fix the selection.
    pub fn probe(config: &EngineConfig) -> MatchingEngine {
        let pipeline = match Localizer::probe(
            &config.model_dir,
            config.allow_download,
            config.detector_confidence,
        ) {
            None => {
                tracing::warn!("no usable face detector; face matching disabled");
                Pipeline::Disabled
            }
            Some(localizer) => {
                let embedding_model = config.model_dir.join(EMBEDDING_MODEL_NAME);
                match EmbeddingExtractor::load(&embedding_model) {
                    Ok(embedder) => {
                        tracing::info!("embedding backend selected");
                        Pipeline::Embedding { localizer, embedder }
                    }
                    Err(error) => {
                        tracing::info!(%error, "embedding backend unavailable, classical backend selected");
                        Pipeline::Classical { localizer }
                    }
                }
            }
        };

        MatchingEngine {
            pipeline,
            scorer_params: config.scorer_params,
            classical_threshold: config.classical_threshold,
            embedding_threshold: config.embedding_threshold,
        }
    }

    /// The active backend, or `None` when the engine is disabled.
    pub fn backend(&self) -> Option<Backend> {
        match &self.pipeline {
            Pipeline::Embedding { .. } => Some(Backend::Embedding),
            Pipeline::Classical { .. } => Some(Backend::Classical),
            Pipeline::Disabled => None,
        }
    }

    /// Minimum search score for a candidate to count as a match, on the
    /// active backend's scale.
    pub fn acceptance_threshold(&self) -> Option<f32> {
        match self.backend()? {
            Backend::Classical => Some(self.classical_threshold),
            Backend::Embedding => Some(self.embedding_threshold),
        }
    }

    /// Extract a descriptor for the most prominent face in the image.
    ///
    /// `None` covers all expected failures: no face detected, undecodable
    /// image, or a disabled engine.
    pub fn extract(&mut self, source: &ImageSource) -> Option<FaceDescriptor> {
        let frame = match source.decode_gray() {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "image decode failed");
                return None;
            }
        };

        match &mut self.pipeline {
            Pipeline::Disabled => {
                tracing::debug!("extract requested but engine is disabled");
                None
            }
            Pipeline::Classical { localizer } => {
                let region = localizer.locate(&frame)?;
                Some(features::extract(&frame, &region))
            }
            Pipeline::Embedding { localizer, embedder } => {
                let region = localizer.locate(&frame)?;
                match embedder.extract(&frame, &region) {
                    Ok(descriptor) => Some(descriptor),
                    Err(error) => {
                        tracing::warn!(%error, "embedding extraction failed");
                        None
                    }
                }
            }
        }
    }

    /// Score two descriptors on the active backend's scale.
    ///
    /// `None` only when the engine is disabled. Panics when a descriptor
    /// was produced by a different backend than the active one.
    pub fn compare(&self, a: &FaceDescriptor, b: &FaceDescriptor) -> Option<f32> {
        match self.backend()? {
            Backend::Classical => Some(scorer::score_classical(a, b, &self.scorer_params)),
            Backend::Embedding => Some(scorer::score_embedding(a, b)),
        }
    }

    /// Compare two raw images.
    ///
    /// On the embedding backend this is direct verification: the model's
    /// own distance and threshold decide, and the score is partitioned at
    /// [`VERIFY_BOUNDARY`]. On the classical backend it is extract+compare
    /// against the classical acceptance threshold.
    pub fn compare_images(&mut self, a: &ImageSource, b: &ImageSource) -> Option<Verification> {
        let da = self.extract(a)?;
        let db = self.extract(b)?;

        match self.backend()? {
            Backend::Embedding => {
                // Embeddings are unit-length, so the dot product is the
                // cosine; distance is its complement.
                let cos: f32 = da
                    .values()
                    .iter()
                    .zip(db.values())
                    .map(|(x, y)| x * y)
                    .sum();
                let distance = 1.0 - cos;
                let score = scorer::verify_score(distance, EMBEDDING_VERIFY_THRESHOLD);
                Some(Verification {
                    score,
                    matched: score >= VERIFY_BOUNDARY,
                    backend: Backend::Embedding,
                })
            }
            Backend::Classical => {
                let score = scorer::score_classical(&da, &db, &self.scorer_params);
                Some(Verification {
                    score,
                    matched: score >= self.classical_threshold,
                    backend: Backend::Classical,
                })
            }
        }
    }

    /// Best match over the candidate set at the backend's acceptance
    /// threshold.
    pub fn search(
        &self,
        query: &FaceDescriptor,
        candidates: &[(String, FaceDescriptor)],
    ) -> Option<MatchResult> {
        let threshold = self.acceptance_threshold()?;
        self.search_with_threshold(query, candidates, threshold)
    }

    /// Best match at an explicit threshold on the active backend's scale.
    pub fn search_with_threshold(
        &self,
        query: &FaceDescriptor,
        candidates: &[(String, FaceDescriptor)],
        threshold: f32,
    ) -> Option<MatchResult> {
        let scorer: Box<dyn Scorer> = match self.backend()? {
            Backend::Classical => Box::new(ClassicalScorer { params: self.scorer_params }),
            Backend::Embedding => Box::new(EmbeddingScorer),
        };
        search::search(scorer.as_ref(), query, candidates, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// An engine probed against an empty model directory with downloads
    /// off: no backend can come up.
    fn disabled_engine() -> MatchingEngine {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig {
            model_dir: tmp.path().to_path_buf(),
            allow_download: false,
            ..EngineConfig::default()
        };
        MatchingEngine::probe(&config)
    }

    #[test]
    fn test_default_config_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.classical_threshold, 70.0);
        assert_eq!(config.embedding_threshold, 90.0);
        assert_eq!(config.detector_confidence, 0.5);
    }

    #[test]
    fn test_disabled_engine_reports_no_backend() {
        let engine = disabled_engine();
        assert!(engine.backend().is_none());
        assert!(engine.acceptance_threshold().is_none());
    }

    #[test]
    fn test_disabled_engine_extract_is_none() {
        let mut engine = disabled_engine();
        let img = image::GrayImage::from_pixel(32, 32, image::Luma([128u8]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        assert!(engine.extract(&ImageSource::Bytes(bytes)).is_none());
    }

    #[test]
    fn test_disabled_engine_compare_and_search_are_none() {
        let engine = disabled_engine();
        let d = FaceDescriptor::new(Backend::Classical, vec![1.0, 0.0]);
        assert!(engine.compare(&d, &d).is_none());
        assert!(engine.search(&d, &[("a".to_string(), d.clone())]).is_none());
    }

    #[test]
    fn test_extract_undecodable_bytes_is_none() {
        let mut engine = disabled_engine();
        assert!(engine
            .extract(&ImageSource::Bytes(b"definitely not an image".to_vec()))
            .is_none());
    }
}
