//! Embedding descriptor extraction via a pretrained ArcFace-style model.
//!
//! Produces 512-dimensional L2-normalized embeddings from the localized
//! face crop. This backend is optional: the model runtime must be present
//! at probe time or the backend is never selected.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::imageops::{self, GrayFrame};
use crate::types::{Backend, FaceDescriptor, FaceRegion, REGION_PADDING_FRACTION};

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5;

/// Declared embedding dimensionality.
pub const EMBEDDING_DIM: usize = 512;

/// File name of the embedding model, expected in the model directory.
pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding model not found: {0} — place the ONNX file in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-style embedding extractor.
pub struct EmbeddingExtractor {
    session: Session,
}

impl EmbeddingExtractor {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded embedding model");

        Ok(Self { session })
    }

    /// Extract an embedding descriptor for a localized face.
    pub fn extract(
        &mut self,
        frame: &GrayFrame,
        region: &FaceRegion,
    ) -> Result<FaceDescriptor, EmbedderError> {
        let padded = region.padded_clamped(REGION_PADDING_FRACTION, frame.width, frame.height);
        let crop = frame.crop(&padded);
        let resized = imageops::resize_bilinear(
            &crop.data,
            crop.width as usize,
            crop.height as usize,
            EMBED_INPUT_SIZE,
            EMBED_INPUT_SIZE,
        );

        let input = preprocess(&resized);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        // L2-normalize so cosine similarity is a plain dot product.
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };

        Ok(FaceDescriptor::new(Backend::Embedding, values))
    }
}

/// Preprocess a 112x112 grayscale crop into a NCHW float tensor.
fn preprocess(crop: &[u8]) -> Array4<f32> {
    let size = EMBED_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            let pixel = crop.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - EMBED_MEAN) / EMBED_STD;
            // Grayscale replicated into all three channels.
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let crop = vec![128u8; EMBED_INPUT_SIZE * EMBED_INPUT_SIZE];
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let crop = vec![255u8; EMBED_INPUT_SIZE * EMBED_INPUT_SIZE];
        let tensor = preprocess(&crop);
        let expected = (255.0 - EMBED_MEAN) / EMBED_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_channels_identical() {
        let crop: Vec<u8> = (0..EMBED_INPUT_SIZE * EMBED_INPUT_SIZE)
            .map(|i| (i % 256) as u8)
            .collect();
        let tensor = preprocess(&crop);
        for y in (0..EMBED_INPUT_SIZE).step_by(13) {
            for x in (0..EMBED_INPUT_SIZE).step_by(13) {
                assert_eq!(tensor[[0, 0, y, x]], tensor[[0, 1, y, x]]);
                assert_eq!(tensor[[0, 1, y, x]], tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_load_missing_model_errors() {
        let result = EmbeddingExtractor::load(Path::new("/nonexistent/w600k_r50.onnx"));
        assert!(matches!(result, Err(EmbedderError::ModelNotFound(_))));
    }
}
