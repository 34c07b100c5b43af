use std::io::Cursor;

use image::{RgbImage, imageops};
use log::debug;
use rustface::{ImageData, Model};

use crate::ml::{
    error::{MlError, MlResult},
    face::detector::{FaceDetector, RawBox, ensure_detectable, normalize_box, retain_confident},
    types::{DecodedImage, Detection},
};

const MIN_FACE_SIZE: u32 = 60;
const SCORE_THRESHOLD: f64 = 2.0;
const PYRAMID_SCALE_FACTOR: f32 = 0.8;
const SLIDE_WINDOW_STEP: u32 = 4;

/// Classical face detector backed by the SeetaFace funnel cascade.
///
/// The cascade's scores are unbounded, so every face it accepts is reported
/// with confidence 1.0.
pub struct CascadeFaceDetector {
    model: Model,
}

impl CascadeFaceDetector {
    pub fn load(model_path: &str) -> MlResult<Self> {
        let bytes = std::fs::read(model_path).map_err(|e| {
            MlError::DetectionUnavailable(format!(
                "failed to read cascade model '{model_path}': {e}"
            ))
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> MlResult<Self> {
        let model = rustface::read_model(Cursor::new(bytes)).map_err(|e| {
            MlError::DetectionUnavailable(format!("failed to parse cascade model: {e}"))
        })?;
        Ok(Self { model })
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn name(&self) -> &'static str {
        "seetaface-cascade"
    }

    fn detect(&self, image: &DecodedImage, min_confidence: f32) -> MlResult<Vec<Detection>> {
        ensure_detectable(image)?;
        let gray = to_grayscale(image)?;
        let (width, height) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_score_thresh(SCORE_THRESHOLD);
        detector.set_pyramid_scale_factor(PYRAMID_SCALE_FACTOR);
        detector.set_slide_window_step(SLIDE_WINDOW_STEP, SLIDE_WINDOW_STEP);

        let faces = detector.detect(&ImageData::new(gray.as_raw(), width, height));

        let mut detections: Vec<Detection> = faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                let raw = RawBox::Absolute {
                    x: f64::from(bbox.x()),
                    y: f64::from(bbox.y()),
                    width: f64::from(bbox.width()),
                    height: f64::from(bbox.height()),
                };
                normalize_box(raw, image.dimensions).map(|rect| Detection {
                    rect,
                    confidence: 1.0,
                })
            })
            .collect();
        retain_confident(&mut detections, min_confidence);
        debug!(
            "seetaface-cascade found {} face(s) in {width}x{height} image",
            detections.len()
        );
        Ok(detections)
    }
}

fn to_grayscale(image: &DecodedImage) -> MlResult<image::GrayImage> {
    let rgb = RgbImage::from_raw(
        image.dimensions.width,
        image.dimensions.height,
        image.rgb.clone(),
    )
    .ok_or_else(|| MlError::DetectionUnavailable("malformed RGB buffer".to_string()))?;
    Ok(imageops::grayscale(&rgb))
}
