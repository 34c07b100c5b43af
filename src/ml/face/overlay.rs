use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect as DrawRect};

use crate::ml::{
    error::{MlError, MlResult},
    types::{DecodedImage, Rect},
};

const MAIN_FACE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OTHER_FACE_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const STROKE_WIDTH: u32 = 2;

/// Draws `boxes` on a copy of `decoded`. The first box is the main portrait
/// and gets its own color.
pub fn draw_detection_overlay(decoded: &DecodedImage, boxes: &[Rect]) -> MlResult<DecodedImage> {
    let mut canvas = RgbImage::from_raw(
        decoded.dimensions.width,
        decoded.dimensions.height,
        decoded.rgb.clone(),
    )
    .ok_or_else(|| MlError::InvalidRequest("overlay source buffer is malformed".to_string()))?;

    for (index, rect) in boxes.iter().enumerate().rev() {
        let color = if index == 0 {
            MAIN_FACE_COLOR
        } else {
            OTHER_FACE_COLOR
        };
        draw_box(&mut canvas, *rect, color);
    }

    Ok(DecodedImage {
        dimensions: decoded.dimensions,
        rgb: canvas.into_raw(),
    })
}

fn draw_box(canvas: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    for inset in 0..STROKE_WIDTH {
        let width = rect.width.saturating_sub(2 * inset);
        let height = rect.height.saturating_sub(2 * inset);
        if width == 0 || height == 0 {
            break;
        }
        let outline = DrawRect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
            .of_size(width, height);
        draw_hollow_rect_mut(canvas, outline, color);
    }
}

#[cfg(test)]
mod tests {
    use super::{MAIN_FACE_COLOR, OTHER_FACE_COLOR, draw_detection_overlay};
    use crate::ml::types::{DecodedImage, Rect};

    fn pixel(image: &DecodedImage, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * image.dimensions.width + x) * 3) as usize;
        [image.rgb[idx], image.rgb[idx + 1], image.rgb[idx + 2]]
    }

    #[test]
    fn main_box_is_highlighted_and_source_untouched() {
        let source = DecodedImage::new(20, 20, vec![0; 20 * 20 * 3]).expect("valid image");
        let boxes = [Rect::new(2, 2, 6, 6), Rect::new(10, 10, 6, 6)];

        let overlay = draw_detection_overlay(&source, &boxes).expect("overlay should draw");

        assert_eq!(pixel(&overlay, 2, 2), MAIN_FACE_COLOR.0);
        assert_eq!(pixel(&overlay, 3, 3), MAIN_FACE_COLOR.0);
        assert_eq!(pixel(&overlay, 10, 15), OTHER_FACE_COLOR.0);
        assert_eq!(pixel(&overlay, 5, 5), [0, 0, 0]);
        assert!(source.rgb.iter().all(|&v| v == 0));
    }

    #[test]
    fn one_pixel_box_is_drawn_once() {
        let source = DecodedImage::new(4, 4, vec![0; 4 * 4 * 3]).expect("valid image");

        let overlay =
            draw_detection_overlay(&source, &[Rect::new(3, 3, 1, 1)]).expect("overlay should draw");

        assert_eq!(pixel(&overlay, 3, 3), MAIN_FACE_COLOR.0);
    }
}
