use std::io::Cursor;

use exif::{In, Reader as ExifReader, Tag};
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::ml::{
    error::{MlError, MlResult},
    types::{DecodedImage, Dimensions},
};

const SUPPORTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

pub fn decode_image_from_path(image_path: &str) -> MlResult<DecodedImage> {
    let file_bytes = std::fs::read(image_path)
        .map_err(|e| MlError::Decode(format!("failed to read image file '{image_path}': {e}")))?;
    decode_image_from_bytes(&file_bytes)
}

/// Decodes JPEG, PNG or WEBP bytes into upright RGB.
pub fn decode_image_from_bytes(image_data: &[u8]) -> MlResult<DecodedImage> {
    let reader = ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| MlError::Decode(format!("failed to guess image format: {e}")))?;
    match reader.format() {
        Some(format) if SUPPORTED_FORMATS.contains(&format) => {}
        Some(format) => {
            return Err(MlError::Decode(format!(
                "unsupported image format {format:?}; expected JPEG, PNG or WEBP"
            )));
        }
        None => return Err(MlError::Decode("unrecognized image format".to_string())),
    }

    let decoded = reader.decode()?;
    let oriented = apply_exif_orientation(decoded, read_exif_orientation(image_data)).to_rgb8();
    if oriented.width() == 0 || oriented.height() == 0 {
        return Err(MlError::Decode("decoded image has zero dimensions".to_string()));
    }

    Ok(DecodedImage {
        dimensions: Dimensions {
            width: oriented.width(),
            height: oriented.height(),
        },
        rgb: oriented.into_raw(),
    })
}

fn read_exif_orientation(image_data: &[u8]) -> u32 {
    let mut reader = Cursor::new(image_data);
    ExifReader::new()
        .read_from_container(&mut reader)
        .ok()
        .and_then(|data| {
            data.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1)
}

fn apply_exif_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.fliph().rotate270(),
        6 => image.rotate90(),
        7 => image.fliph().rotate90(),
        8 => image.rotate270(),
        _ => image,
    }
}
