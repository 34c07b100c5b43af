use crate::ml::{
    error::{MlError, MlResult},
    types::{DecodedImage, Detection, Dimensions, Rect},
};

/// A face-detection backend.
///
/// Implementations take an RGB pixel grid and return zero or more boxes in
/// absolute pixel coordinates, already clamped to the image. Order is not
/// significant; the crop pipeline imposes its own.
pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, image: &DecodedImage, min_confidence: f32) -> MlResult<Vec<Detection>>;
}

/// Box as produced by a backend, before it is mapped into the image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawBox {
    /// Fractions of the image width/height.
    Relative {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// Pixels, possibly negative or past the image edge.
    Absolute {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

pub fn ensure_detectable(image: &DecodedImage) -> MlResult<()> {
    if image.is_empty() {
        return Err(MlError::DetectionUnavailable(
            "image dimensions cannot be zero".to_string(),
        ));
    }
    let expected_len = image.dimensions.width as usize * image.dimensions.height as usize * 3;
    if image.rgb.len() != expected_len {
        return Err(MlError::DetectionUnavailable(format!(
            "RGB buffer holds {} bytes, expected {expected_len}",
            image.rgb.len()
        )));
    }
    Ok(())
}

/// Maps a backend box into pixel space and trims it to the image.
///
/// Boxes hanging over an edge are cut at the edge. A box that collapses to
/// nothing is kept as a one pixel sliver at the nearest edge. Returns `None`
/// only for non-finite input or an empty image.
pub fn normalize_box(raw: RawBox, dimensions: Dimensions) -> Option<Rect> {
    if dimensions.width == 0 || dimensions.height == 0 {
        return None;
    }
    let image_width = f64::from(dimensions.width);
    let image_height = f64::from(dimensions.height);

    let (x_min, y_min, x_max, y_max) = match raw {
        RawBox::Relative {
            x,
            y,
            width,
            height,
        } => {
            let (x, y, width, height) = (
                f64::from(x),
                f64::from(y),
                f64::from(width),
                f64::from(height),
            );
            (
                x * image_width,
                y * image_height,
                (x + width) * image_width,
                (y + height) * image_height,
            )
        }
        RawBox::Absolute {
            x,
            y,
            width,
            height,
        } => (x, y, x + width, y + height),
    };

    if ![x_min, y_min, x_max, y_max].iter().all(|v| v.is_finite()) {
        return None;
    }

    let (x_start, x_end) = clamp_span(x_min, x_max, dimensions.width);
    let (y_start, y_end) = clamp_span(y_min, y_max, dimensions.height);
    Some(Rect::new(x_start, y_start, x_end - x_start, y_end - y_start))
}

fn clamp_span(start: f64, end: f64, limit: u32) -> (u32, u32) {
    let limit_f = f64::from(limit);
    let start = start.round().clamp(0.0, limit_f - 1.0) as u32;
    let end = end.round().clamp(0.0, limit_f) as u32;
    if end <= start {
        return (start, (start + 1).min(limit));
    }
    (start, end)
}

/// Drops detections under the threshold. Backends that cannot filter
/// themselves rely on this.
pub fn retain_confident(detections: &mut Vec<Detection>, min_confidence: f32) {
    detections.retain(|d| d.confidence.is_finite() && d.confidence >= min_confidence);
}
