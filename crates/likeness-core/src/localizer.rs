//! Face localization: find the most prominent face region in an image.
//!
//! A primary deep detector is tried first; when its model cannot be
//! resolved or inference throws, the classical cascade takes over. Among
//! multiple detections the largest box wins: registry photos are single
//! forward-facing subjects, so the largest region approximates the subject
//! even under partial false positives.

use std::path::Path;

use crate::cascade::{CascadeDetector, CASCADE_MODEL};
use crate::dnn::{DnnDetector, DNN_MODEL};
use crate::imageops::GrayFrame;
use crate::model_fetch;
use crate::types::FaceRegion;

/// A raw detector hit in pixel coordinates, before padding/clamping.
#[derive(Debug, Clone)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face localizer with primary/fallback detector selection.
pub struct Localizer {
    primary: Option<DnnDetector>,
    fallback: Option<CascadeDetector>,
}

impl Localizer {
    /// Probe for usable detectors.
    ///
    /// The primary model may be fetched on first use; a failed fetch or
    /// load is logged and never aborts probing. Returns `None` only when
    /// neither detector is usable.
    pub fn probe(model_dir: &Path, allow_download: bool, confidence_threshold: f32) -> Option<Localizer> {
        let primary = match model_fetch::resolve(&DNN_MODEL, model_dir, allow_download)
            .map_err(|e| e.to_string())
            .and_then(|path| {
                DnnDetector::load(&path, confidence_threshold).map_err(|e| e.to_string())
            }) {
            Ok(detector) => Some(detector),
            Err(error) => {
                tracing::warn!(%error, "primary face detector unavailable, will use cascade");
                None
            }
        };

        let fallback = match model_fetch::resolve(&CASCADE_MODEL, model_dir, allow_download)
            .map_err(|e| e.to_string())
            .and_then(|path| CascadeDetector::load(&path).map_err(|e| e.to_string()))
        {
            Ok(detector) => Some(detector),
            Err(error) => {
                tracing::warn!(%error, "cascade face detector unavailable");
                None
            }
        };

        if primary.is_none() && fallback.is_none() {
            tracing::warn!("no face detector available");
            return None;
        }

        Some(Localizer { primary, fallback })
    }

    /// Build a localizer from already-constructed detectors.
    pub fn new(primary: Option<DnnDetector>, fallback: Option<CascadeDetector>) -> Option<Localizer> {
        if primary.is_none() && fallback.is_none() {
            return None;
        }
        Some(Localizer { primary, fallback })
    }

    /// Locate the most prominent face. `None` means no face cleared the
    /// detection bar; downstream treats that as "cannot extract".
    pub fn locate(&mut self, frame: &GrayFrame) -> Option<FaceRegion> {
        if let Some(primary) = &mut self.primary {
            match primary.detect(frame) {
                Ok(detections) if !detections.is_empty() => {
                    return most_prominent(&detections).map(|d| to_region(d, frame));
                }
                Ok(_) => {
                    tracing::debug!("primary detector found no faces, trying cascade");
                }
                Err(error) => {
                    tracing::warn!(%error, "primary detector failed, trying cascade");
                }
            }
        }

        let fallback = self.fallback.as_ref()?;
        let detections = fallback.detect(frame);
        most_prominent(&detections).map(|d| to_region(d, frame))
    }
}

/// Largest box by area; first-encountered wins ties.
fn most_prominent(detections: &[Detection]) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for detection in detections {
        let area = detection.width * detection.height;
        match best {
            Some(current) if area <= current.width * current.height => {}
            _ => best = Some(detection),
        }
    }
    best
}

/// Clamp a raw detection into an integral in-bounds region.
fn to_region(detection: &Detection, frame: &GrayFrame) -> FaceRegion {
    let x = detection.x.max(0.0).floor() as u32;
    let y = detection.y.max(0.0).floor() as u32;
    let x = x.min(frame.width.saturating_sub(1));
    let y = y.min(frame.height.saturating_sub(1));
    let width = (detection.width.round() as u32).clamp(1, frame.width - x);
    let height = (detection.height.round() as u32).clamp(1, frame.height - y);
    FaceRegion { x, y, width, height }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Detection {
        Detection { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_most_prominent_picks_largest_area() {
        let detections = vec![
            detection(0.0, 0.0, 20.0, 20.0, 0.99),
            detection(50.0, 50.0, 60.0, 40.0, 0.6),
            detection(10.0, 10.0, 30.0, 30.0, 0.8),
        ];
        let best = most_prominent(&detections).unwrap();
        assert_eq!(best.width, 60.0);
    }

    #[test]
    fn test_most_prominent_tie_keeps_first() {
        let detections = vec![
            detection(0.0, 0.0, 30.0, 30.0, 0.5),
            detection(40.0, 40.0, 30.0, 30.0, 0.9),
        ];
        let best = most_prominent(&detections).unwrap();
        assert_eq!(best.x, 0.0);
    }

    #[test]
    fn test_most_prominent_empty_is_none() {
        assert!(most_prominent(&[]).is_none());
    }

    #[test]
    fn test_to_region_clamps_negative_origin() {
        let frame = GrayFrame::new(vec![0; 100 * 80], 100, 80);
        let region = to_region(&detection(-5.0, -3.0, 40.0, 40.0, 0.9), &frame);
        assert_eq!(region.x, 0);
        assert_eq!(region.y, 0);
        assert_eq!(region.width, 40);
    }

    #[test]
    fn test_to_region_clamps_overflow() {
        let frame = GrayFrame::new(vec![0; 100 * 80], 100, 80);
        let region = to_region(&detection(90.0, 70.0, 50.0, 50.0, 0.9), &frame);
        assert!(region.x + region.width <= 100);
        assert!(region.y + region.height <= 80);
        assert!(region.width > 0 && region.height > 0);
    }

    #[test]
    fn test_localizer_requires_at_least_one_detector() {
        assert!(Localizer::new(None, None).is_none());
    }
}
