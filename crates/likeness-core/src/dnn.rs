//! Primary face detector: an UltraFace-style ONNX model via ONNX Runtime.
//!
//! The model takes a 320x240 input and emits per-anchor confidences plus
//! corner boxes in normalized [0, 1] coordinates, decoded here into pixel
//! rectangles with NMS post-processing.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::imageops::{self, GrayFrame};
use crate::localizer::Detection;
use crate::model_fetch::ModelSpec;

const DNN_INPUT_WIDTH: usize = 320;
const DNN_INPUT_HEIGHT: usize = 240;
const DNN_MEAN: f32 = 127.0;
const DNN_STD: f32 = 128.0;
const DNN_NMS_THRESHOLD: f32 = 0.4;

/// Detector model artifact, fetched lazily on first use.
pub const DNN_MODEL: ModelSpec = ModelSpec {
    name: "version-RFB-320.onnx",
    url: "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/ultraface/models/version-RFB-320.onnx",
    sha256: None,
};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX-based face detector.
pub struct DnnDetector {
    session: Session,
    confidence_threshold: f32,
    /// Output tensor positions (scores, boxes), discovered by name at load
    /// time with a positional fallback.
    output_indices: (usize, usize),
}

impl DnnDetector {
    /// Load the detector model from the given path.
    pub fn load(model_path: &Path, confidence_threshold: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded face detection model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let output_indices = discover_output_indices(&output_names);

        Ok(Self {
            session,
            confidence_threshold,
            output_indices,
        })
    }

    /// Detect faces, returning pixel-coordinate boxes sorted by confidence.
    pub fn detect(&mut self, frame: &GrayFrame) -> Result<Vec<Detection>, DetectorError> {
        let input = self.preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (score_idx, box_idx) = self.output_indices;
        let (_, scores) = outputs[score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[box_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let detections = decode_detections(
            scores,
            boxes,
            frame.width as f32,
            frame.height as f32,
            self.confidence_threshold,
        );

        let mut result = nms(detections, DNN_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }

    /// Resize the frame to the model input and normalize to its expected
    /// distribution, replicating gray into 3 channels NCHW.
    fn preprocess(&self, frame: &GrayFrame) -> Array4<f32> {
        let resized = imageops::resize_bilinear(
            &frame.data,
            frame.width as usize,
            frame.height as usize,
            DNN_INPUT_WIDTH,
            DNN_INPUT_HEIGHT,
        );

        let mut tensor = Array4::<f32>::zeros((1, 3, DNN_INPUT_HEIGHT, DNN_INPUT_WIDTH));
        for y in 0..DNN_INPUT_HEIGHT {
            for x in 0..DNN_INPUT_WIDTH {
                let normalized = (resized[y * DNN_INPUT_WIDTH + x] as f32 - DNN_MEAN) / DNN_STD;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        tensor
    }
}

/// Map output tensors to (scores, boxes) slots by name, falling back to
/// positional order when the names are not recognized.
fn discover_output_indices(names: &[String]) -> (usize, usize) {
    let score_idx = names.iter().position(|n| n.contains("score"));
    let box_idx = names.iter().position(|n| n.contains("box"));
    match (score_idx, box_idx) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::debug!(?names, "detector output names not recognized, using positional mapping");
            (0, 1)
        }
    }
}

/// Decode per-anchor confidences and normalized corner boxes into pixel
/// rectangles, dropping anchors at or below the confidence threshold.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    frame_w: f32,
    frame_h: f32,
    threshold: f32,
) -> Vec<Detection> {
    let anchors = scores.len() / 2;
    let mut detections = Vec::new();

    for i in 0..anchors {
        // Two-class softmax output: [background, face]
        let confidence = scores[i * 2 + 1];
        if confidence <= threshold {
            continue;
        }

        let off = i * 4;
        if off + 3 >= boxes.len() {
            continue;
        }

        let x1 = (boxes[off] * frame_w).clamp(0.0, frame_w - 1.0);
        let y1 = (boxes[off + 1] * frame_h).clamp(0.0, frame_h - 1.0);
        let x2 = (boxes[off + 2] * frame_w).clamp(0.0, frame_w);
        let y2 = (boxes[off + 3] * frame_h).clamp(0.0, frame_h);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(Detection {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two detections.
fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = a.width * a.height;
    let area_b = b.width * b.height;
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_detection(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Detection {
        Detection { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_detection(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = make_detection(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_detection(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_detection(0.0, 0.0, 100.0, 100.0, 0.9),
            make_detection(5.0, 5.0, 100.0, 100.0, 0.8),
            make_detection(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, DNN_NMS_THRESHOLD);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        // Two anchors: one above threshold, one below.
        let scores = vec![0.1, 0.9, 0.8, 0.2];
        let boxes = vec![
            0.25, 0.25, 0.75, 0.75, // kept
            0.0, 0.0, 0.5, 0.5, // dropped (confidence 0.2)
        ];
        let detections = decode_detections(&scores, &boxes, 200.0, 100.0, 0.5);
        assert_eq!(detections.len(), 1);

        let d = &detections[0];
        assert!((d.x - 50.0).abs() < 1e-3);
        assert!((d.y - 25.0).abs() < 1e-3);
        assert!((d.width - 100.0).abs() < 1e-3);
        assert!((d.height - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_drops_degenerate_boxes() {
        let scores = vec![0.0, 0.9];
        let boxes = vec![0.5, 0.5, 0.5, 0.5]; // zero area
        assert!(decode_detections(&scores, &boxes, 100.0, 100.0, 0.5).is_empty());
    }

    #[test]
    fn test_decode_threshold_is_exclusive() {
        let scores = vec![0.5, 0.5];
        let boxes = vec![0.0, 0.0, 1.0, 1.0];
        // Confidence exactly at the threshold is discarded.
        assert!(decode_detections(&scores, &boxes, 100.0, 100.0, 0.5).is_empty());
    }

    #[test]
    fn test_discover_output_indices_by_name() {
        let names = vec!["boxes".to_string(), "scores".to_string()];
        assert_eq!(discover_output_indices(&names), (1, 0));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names = vec!["473".to_string(), "474".to_string()];
        assert_eq!(discover_output_indices(&names), (0, 1));
    }
}
