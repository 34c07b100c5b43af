use std::cmp::{Ordering, Reverse};

use image::{RgbImage, imageops};

use crate::ml::{
    error::{MlError, MlResult},
    face::detector::retain_confident,
    types::{CropRequest, CropResult, DecodedImage, Detection, Dimensions, FaceCrop, Rect},
};

/// Turns detections into margin-expanded, ordered face crops.
///
/// Detections under `request.min_confidence` are dropped first, then each
/// box is trimmed to the image and boxes with nothing left inside it are
/// dropped. The rest are ranked by the area of the trimmed detector box,
/// then each survivor is expanded by the margin, clamped to the image and
/// cut out without any resampling. No survivors is an empty result, not an error.
pub fn crop_faces(
    decoded: &DecodedImage,
    detections: &[Detection],
    request: &CropRequest,
) -> MlResult<CropResult> {
    request.validate()?;

    let mut candidates = detections.to_vec();
    retain_confident(&mut candidates, request.min_confidence);
    if candidates.is_empty() {
        return Ok(CropResult::default());
    }
    if decoded.is_empty() {
        return Err(MlError::InvalidRequest(
            "cannot crop faces from an empty image".to_string(),
        ));
    }

    let candidates: Vec<Detection> = candidates
        .into_iter()
        .filter_map(|detection| {
            detection
                .rect
                .intersect(decoded.dimensions)
                .map(|rect| Detection { rect, ..detection })
        })
        .collect();
    if candidates.is_empty() {
        return Ok(CropResult::default());
    }

    let ranked = rank_detections(candidates);
    let source = rgb_image_view(decoded)?;

    let crops = ranked
        .into_iter()
        .take(request.crop_limit())
        .map(|detection| {
            let rect = expand_rect(detection.rect, request.margin_pct, decoded.dimensions);
            FaceCrop {
                detection,
                rect,
                image: extract_region(&source, rect),
            }
        })
        .collect();

    Ok(CropResult { crops })
}

/// Largest box first; ties go to the leftmost, then topmost, then the more
/// confident detection.
pub fn rank_detections(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(compare_for_ranking);
    detections
}

fn compare_for_ranking(a: &Detection, b: &Detection) -> Ordering {
    (Reverse(a.rect.area()), a.rect.x, a.rect.y)
        .cmp(&(Reverse(b.rect.area()), b.rect.x, b.rect.y))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
}

/// Grows `rect` by `margin_pct` percent of its width and height, half on
/// each side, and clamps the result to the image.
pub fn expand_rect(rect: Rect, margin_pct: f32, dimensions: Dimensions) -> Rect {
    let margin = f64::from(margin_pct.max(0.0)) / 100.0;
    let half_x = f64::from(rect.width) * margin / 2.0;
    let half_y = f64::from(rect.height) * margin / 2.0;

    let x_start = (f64::from(rect.x) - half_x).floor();
    let y_start = (f64::from(rect.y) - half_y).floor();
    let x_end = (f64::from(rect.right()) + half_x).ceil();
    let y_end = (f64::from(rect.bottom()) + half_y).ceil();

    let (x_start, x_end) = clamp_axis(x_start, x_end, dimensions.width);
    let (y_start, y_end) = clamp_axis(y_start, y_end, dimensions.height);
    Rect::new(x_start, y_start, x_end - x_start, y_end - y_start)
}

fn clamp_axis(start: f64, end: f64, limit: u32) -> (u32, u32) {
    let limit_f = f64::from(limit);
    let start = start.clamp(0.0, limit_f) as u32;
    let end = end.clamp(0.0, limit_f) as u32;
    (start, end.max(start))
}

fn rgb_image_view(decoded: &DecodedImage) -> MlResult<RgbImage> {
    RgbImage::from_raw(
        decoded.dimensions.width,
        decoded.dimensions.height,
        decoded.rgb.clone(),
    )
    .ok_or_else(|| {
        MlError::InvalidRequest(format!(
            "RGB buffer of {} bytes does not match {}x{}",
            decoded.rgb.len(),
            decoded.dimensions.width,
            decoded.dimensions.height
        ))
    })
}

/// Copies the pixels under `rect`. `rect` must already lie inside `source`.
pub fn extract_region(source: &RgbImage, rect: Rect) -> DecodedImage {
    let region = imageops::crop_imm(source, rect.x, rect.y, rect.width, rect.height).to_image();
    DecodedImage {
        dimensions: Dimensions {
            width: region.width(),
            height: region.height(),
        },
        rgb: region.into_raw(),
    }
}
