//! Fallback face detector: SeetaFace frontal cascade via the `rustface`
//! crate. Used when the primary model cannot be loaded; returns rectangles
//! directly in pixel coordinates.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;

use crate::imageops::GrayFrame;
use crate::localizer::Detection;
use crate::model_fetch::ModelSpec;

/// Cascade model artifact, shared with the rustface upstream.
pub const CASCADE_MODEL: ModelSpec = ModelSpec {
    name: "seeta_fd_frontal_v1.0.bin",
    url: "https://github.com/atomashpolskiy/rustface/raw/master/model/seeta_fd_frontal_v1.0.bin",
    sha256: None,
};

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade model not found: {0}")]
    ModelNotFound(String),
    #[error("failed to read cascade model: {0}")]
    ModelRead(#[from] std::io::Error),
}

/// SeetaFace cascade detector.
pub struct CascadeDetector {
    model: rustface::Model,
}

impl CascadeDetector {
    /// Load the cascade model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, CascadeError> {
        if !model_path.exists() {
            return Err(CascadeError::ModelNotFound(model_path.display().to_string()));
        }
        let reader = BufReader::new(File::open(model_path)?);
        let model = rustface::read_model(reader)?;
        tracing::info!(path = %model_path.display(), "loaded cascade detection model");
        Ok(Self { model })
    }

    /// Detect faces in a grayscale frame.
    ///
    /// The underlying detector is stateful, so one is built per call from
    /// the shared model; detection itself stays free of shared mutable
    /// state across calls.
    pub fn detect(&self, frame: &GrayFrame) -> Vec<Detection> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(
            &frame.data,
            frame.width,
            frame.height,
        ));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Detection {
                    x: bbox.x() as f32,
                    y: bbox.y() as f32,
                    width: bbox.width() as f32,
                    height: bbox.height() as f32,
                    confidence: face.score() as f32,
                }
            })
            .collect()
    }
}
