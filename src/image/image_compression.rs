use image::{
    ColorType, ImageEncoder,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};

use crate::ml::{
    error::{MlError, MlResult},
    types::DecodedImage,
};

pub const PORTRAIT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodedImageFormat {
    Jpeg { quality: u8 },
    Png,
}

pub fn encode_rgb(
    rgb_bytes: &[u8],
    width: u32,
    height: u32,
    format: EncodedImageFormat,
) -> MlResult<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(MlError::Encode(
            "cannot encode image with zero width or height".to_string(),
        ));
    }

    let expected_len = width as usize * height as usize * 3;
    if rgb_bytes.len() != expected_len {
        return Err(MlError::Encode(format!(
            "invalid RGB buffer length {}, expected {} for {}x{}",
            rgb_bytes.len(),
            expected_len,
            width,
            height
        )));
    }

    let mut encoded = Vec::new();
    match format {
        EncodedImageFormat::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut encoded, quality)
                .write_image(rgb_bytes, width, height, ColorType::Rgb8.into())
                .map_err(|e| MlError::Encode(format!("failed to encode JPEG: {e}")))?;
        }
        EncodedImageFormat::Png => {
            PngEncoder::new(&mut encoded)
                .write_image(rgb_bytes, width, height, ColorType::Rgb8.into())
                .map_err(|e| MlError::Encode(format!("failed to encode PNG: {e}")))?;
        }
    }
    Ok(encoded)
}

pub fn encode_decoded(image: &DecodedImage, format: EncodedImageFormat) -> MlResult<Vec<u8>> {
    encode_rgb(
        &image.rgb,
        image.dimensions.width,
        image.dimensions.height,
        format,
    )
}

#[cfg(test)]
mod tests {
    use image::ImageFormat;

    use super::{EncodedImageFormat, PORTRAIT_JPEG_QUALITY, encode_decoded, encode_rgb};
    use crate::ml::types::DecodedImage;

    #[test]
    fn encode_rgb_jpeg_produces_valid_jpeg() {
        let rgb = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let encoded = encode_rgb(
            &rgb,
            2,
            2,
            EncodedImageFormat::Jpeg {
                quality: PORTRAIT_JPEG_QUALITY,
            },
        )
        .expect("jpeg encoding should succeed");

        assert!(!encoded.is_empty());
        image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)
            .expect("encoded bytes should be valid JPEG");
    }

    #[test]
    fn encode_decoded_png_round_trips_pixels() {
        let source = DecodedImage::new(2, 1, vec![10, 20, 30, 40, 50, 60]).expect("valid image");

        let encoded = encode_decoded(&source, EncodedImageFormat::Png).expect("png encoding");
        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Png)
            .expect("encoded bytes should be valid PNG")
            .to_rgb8();

        assert_eq!(decoded.into_raw(), source.rgb);
    }

    #[test]
    fn encode_rgb_rejects_zero_sized_image() {
        let result = encode_rgb(&[], 0, 3, EncodedImageFormat::Png);
        assert!(result.is_err());
    }

    #[test]
    fn encode_rgb_rejects_invalid_buffer_size() {
        let invalid_rgb = vec![0, 1, 2];
        let result = encode_rgb(
            &invalid_rgb,
            2,
            2,
            EncodedImageFormat::Jpeg {
                quality: PORTRAIT_JPEG_QUALITY,
            },
        );

        assert!(result.is_err());
    }
}
