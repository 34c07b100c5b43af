use log::debug;

use crate::ml::{
    error::MlResult,
    face::{crop::crop_faces, detector::FaceDetector},
    types::{CropRequest, CropResult, DecodedImage},
};

pub const NO_FACES_MESSAGE: &str =
    "No faces detected. Try lowering the confidence or using a clearer image.";

/// One extraction request: detect faces, then crop them.
pub fn run_portrait_extraction<D>(
    detector: &D,
    decoded: &DecodedImage,
    request: &CropRequest,
) -> MlResult<CropResult>
where
    D: FaceDetector + ?Sized,
{
    request.validate()?;

    let detections = detector.detect(decoded, request.min_confidence)?;
    debug!(
        "{} returned {} detection(s) for {}x{} image",
        detector.name(),
        detections.len(),
        decoded.dimensions.width,
        decoded.dimensions.height
    );

    crop_faces(decoded, &detections, request)
}

#[cfg(test)]
mod tests {
    use super::run_portrait_extraction;
    use crate::ml::{
        error::{MlError, MlResult},
        face::detector::FaceDetector,
        types::{CropRequest, DecodedImage, Detection, Rect},
    };

    struct FixedDetector(Vec<Detection>);

    impl FaceDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _image: &DecodedImage, _min_confidence: f32) -> MlResult<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDetector;

    impl FaceDetector for BrokenDetector {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn detect(&self, _image: &DecodedImage, _min_confidence: f32) -> MlResult<Vec<Detection>> {
            Err(MlError::DetectionUnavailable("model not loaded".to_string()))
        }
    }

    #[test]
    fn detector_output_is_filtered_even_if_backend_ignores_threshold() {
        let decoded = DecodedImage::new(10, 10, vec![0; 300]).expect("valid image");
        let detector = FixedDetector(vec![Detection {
            rect: Rect::new(1, 1, 4, 4),
            confidence: 0.2,
        }]);

        let result = run_portrait_extraction(&detector, &decoded, &CropRequest::default())
            .expect("extraction should succeed");

        assert!(result.is_empty());
    }

    #[test]
    fn backend_failure_is_terminal() {
        let decoded = DecodedImage::new(10, 10, vec![0; 300]).expect("valid image");

        let result = run_portrait_extraction(&BrokenDetector, &decoded, &CropRequest::default());

        assert!(matches!(result, Err(MlError::DetectionUnavailable(_))));
    }

    #[test]
    fn invalid_request_is_rejected_before_detection() {
        let decoded = DecodedImage::new(10, 10, vec![0; 300]).expect("valid image");
        let request = CropRequest {
            max_faces: 0,
            ..Default::default()
        };

        let result = run_portrait_extraction(&BrokenDetector, &decoded, &request);

        assert!(matches!(result, Err(MlError::InvalidRequest(_))));
    }
}
