//! Portrait extraction for scanned ID cards: detect faces, then cut them out
//! with a configurable margin.

pub mod api;
pub mod image;
pub mod ml;

pub use ml::{
    error::{MlError, MlResult},
    face::{
        crop::crop_faces, detector::FaceDetector, portrait::run_portrait_extraction,
    },
    types::{CropRequest, CropResult, DecodedImage, Detection, FaceCrop, Rect, SelectionMode},
};
