use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image as FirImage, ImageRef as FirImageRef},
};

use crate::ml::{
    error::{MlError, MlResult},
    types::DecodedImage,
};

pub const YOLO_INPUT_WIDTH: usize = 640;
pub const YOLO_INPUT_HEIGHT: usize = 640;
const PAD_VALUE: f32 = 114.0;

/// Letterboxed model input: the image scaled to fit, anchored top-left and
/// padded with grey.
#[derive(Clone, Debug)]
pub struct LetterboxedInput {
    /// Planar CHW, values in `[0, 1]`.
    pub tensor: Vec<f32>,
    pub scaled_width: usize,
    pub scaled_height: usize,
}

pub fn preprocess_yolo(decoded: &DecodedImage) -> MlResult<LetterboxedInput> {
    if decoded.is_empty() {
        return Err(MlError::DetectionUnavailable(
            "image dimensions cannot be zero".to_string(),
        ));
    }

    let src_w = decoded.dimensions.width as f32;
    let src_h = decoded.dimensions.height as f32;
    let scale = (YOLO_INPUT_WIDTH as f32 / src_w).min(YOLO_INPUT_HEIGHT as f32 / src_h);
    let scaled_width = (src_w * scale)
        .round()
        .clamp(1.0, YOLO_INPUT_WIDTH as f32) as usize;
    let scaled_height = (src_h * scale)
        .round()
        .clamp(1.0, YOLO_INPUT_HEIGHT as f32) as usize;

    let source = FirImageRef::new(
        decoded.dimensions.width,
        decoded.dimensions.height,
        decoded.rgb.as_slice(),
        PixelType::U8x3,
    )
    .map_err(|e| MlError::DetectionUnavailable(format!("invalid decoded RGB buffer: {e}")))?;

    let mut resized = FirImage::new(scaled_width as u32, scaled_height as u32, PixelType::U8x3);
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    Resizer::new()
        .resize(&source, &mut resized, Some(&options))
        .map_err(|e| {
            MlError::DetectionUnavailable(format!("failed to resize detector input: {e}"))
        })?;

    let plane = YOLO_INPUT_WIDTH * YOLO_INPUT_HEIGHT;
    let mut tensor = vec![PAD_VALUE / 255.0; 3 * plane];
    let pixels = resized.buffer();
    for y in 0..scaled_height {
        for x in 0..scaled_width {
            let src_idx = (y * scaled_width + x) * 3;
            let dst_idx = y * YOLO_INPUT_WIDTH + x;
            tensor[dst_idx] = pixels[src_idx] as f32 / 255.0;
            tensor[dst_idx + plane] = pixels[src_idx + 1] as f32 / 255.0;
            tensor[dst_idx + 2 * plane] = pixels[src_idx + 2] as f32 / 255.0;
        }
    }

    Ok(LetterboxedInput {
        tensor,
        scaled_width,
        scaled_height,
    })
}

#[cfg(test)]
mod tests {
    use super::{PAD_VALUE, YOLO_INPUT_HEIGHT, YOLO_INPUT_WIDTH, preprocess_yolo};
    use crate::ml::types::DecodedImage;

    #[test]
    fn wide_image_is_padded_below() {
        let decoded = DecodedImage::new(320, 160, vec![255; 320 * 160 * 3]).expect("valid image");

        let input = preprocess_yolo(&decoded).expect("preprocess should succeed");

        assert_eq!(input.scaled_width, 640);
        assert_eq!(input.scaled_height, 320);
        assert_eq!(input.tensor.len(), 3 * YOLO_INPUT_WIDTH * YOLO_INPUT_HEIGHT);
        assert!((input.tensor[0] - 1.0).abs() < 1e-6);
        let padded = 400 * YOLO_INPUT_WIDTH + 10;
        assert!((input.tensor[padded] - PAD_VALUE / 255.0).abs() < 1e-6);
    }

    #[test]
    fn empty_image_is_rejected() {
        let decoded = DecodedImage::new(0, 0, Vec::new()).expect("valid empty image");
        assert!(preprocess_yolo(&decoded).is_err());
    }
}
