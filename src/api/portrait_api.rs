use crate::image::{
    decode::{decode_image_from_bytes, decode_image_from_path},
    image_compression::{EncodedImageFormat, PORTRAIT_JPEG_QUALITY, encode_decoded},
};
use crate::ml::{
    error::{MlError, MlResult},
    face::{
        detector::FaceDetector,
        overlay::draw_detection_overlay,
        portrait::{NO_FACES_MESSAGE, run_portrait_extraction},
    },
    runtime::{self, DetectorModelPaths, DetectorRuntimeConfig, ExecutionProviderPolicy},
    types::{CropRequest, CropResult, DecodedImage, Rect, SelectionMode},
};

#[derive(Clone, Debug)]
pub struct RustExecutionProviderPolicy {
    pub prefer_coreml: bool,
    pub prefer_nnapi: bool,
    pub prefer_xnnpack: bool,
    pub allow_cpu_fallback: bool,
}

impl Default for RustExecutionProviderPolicy {
    fn default() -> Self {
        let policy = ExecutionProviderPolicy::default();
        Self {
            prefer_coreml: policy.prefer_coreml,
            prefer_nnapi: policy.prefer_nnapi,
            prefer_xnnpack: policy.prefer_xnnpack,
            allow_cpu_fallback: policy.allow_cpu_fallback,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RustDetectorModelPaths {
    pub neural_model_path: String,
    pub cascade_model_path: String,
}

#[derive(Clone, Debug, Default)]
pub struct RustPortraitRuntimeConfig {
    pub model_paths: RustDetectorModelPaths,
    pub provider_policy: RustExecutionProviderPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RustSelectionMode {
    #[default]
    LargestOnly,
    AllFaces,
}

#[derive(Clone, Debug)]
pub struct RustCropOptions {
    pub min_confidence: f64,
    pub margin_pct: f64,
    pub mode: RustSelectionMode,
    pub max_faces: u32,
    pub jpeg_quality: u8,
    pub render_overlay: bool,
}

impl Default for RustCropOptions {
    fn default() -> Self {
        let request = CropRequest::default();
        Self {
            min_confidence: f64::from(request.min_confidence),
            margin_pct: f64::from(request.margin_pct),
            mode: RustSelectionMode::LargestOnly,
            max_faces: request.max_faces as u32,
            jpeg_quality: PORTRAIT_JPEG_QUALITY,
            render_overlay: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExtractPortraitsRequest {
    pub image_bytes: Vec<u8>,
    pub options: RustCropOptions,
    pub runtime: RustPortraitRuntimeConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RustRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct RustPortrait {
    pub detection_box: RustRect,
    pub crop_box: RustRect,
    pub score: f64,
    pub jpeg: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct RustDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct ExtractPortraitsResult {
    pub decoded_image_size: RustDimensions,
    pub detector: String,
    /// Largest first; the first entry is the main portrait.
    pub portraits: Vec<RustPortrait>,
    /// The input with the selected boxes drawn on it, JPEG encoded.
    pub overlay_jpeg: Option<Vec<u8>>,
    pub no_faces_found: bool,
    pub message: Option<String>,
}

impl ExtractPortraitsResult {
    pub fn main_portrait(&self) -> Option<&RustPortrait> {
        self.portraits.first()
    }
}

pub fn init_portrait_runtime(config: RustPortraitRuntimeConfig) -> Result<(), String> {
    runtime::ensure_runtime(&to_runtime_config(&config)).map_err(|e| e.to_string())
}

/// Name of the backend the runtime settled on, if it is up.
pub fn active_portrait_detector() -> Option<String> {
    runtime::active_backend_name().map(str::to_string)
}

pub fn release_portrait_runtime() -> Result<(), String> {
    runtime::release_runtime().map_err(|e| e.to_string())
}

pub fn extract_portraits(req: ExtractPortraitsRequest) -> Result<ExtractPortraitsResult, String> {
    extract_portraits_inner(req).map_err(|e| e.to_string())
}

pub fn extract_portraits_from_path(
    image_path: String,
    options: RustCropOptions,
    runtime: RustPortraitRuntimeConfig,
) -> Result<ExtractPortraitsResult, String> {
    let decoded = decode_image_from_path(&image_path).map_err(|e| e.to_string())?;
    extract_decoded(&decoded, &options, &to_runtime_config(&runtime)).map_err(|e| e.to_string())
}

fn extract_portraits_inner(req: ExtractPortraitsRequest) -> MlResult<ExtractPortraitsResult> {
    let decoded = decode_image_from_bytes(&req.image_bytes)?;
    extract_decoded(&decoded, &req.options, &to_runtime_config(&req.runtime))
}

fn extract_decoded(
    decoded: &DecodedImage,
    options: &RustCropOptions,
    runtime_config: &DetectorRuntimeConfig,
) -> MlResult<ExtractPortraitsResult> {
    let request = to_crop_request(options)?;
    runtime::with_detector(runtime_config, |detector| {
        extract_with_detector(detector, decoded, &request, options)
    })
}

/// Extraction against an explicit backend, bypassing the shared runtime.
pub fn extract_with_detector<D>(
    detector: &D,
    decoded: &DecodedImage,
    request: &CropRequest,
    options: &RustCropOptions,
) -> MlResult<ExtractPortraitsResult>
where
    D: FaceDetector + ?Sized,
{
    let result = run_portrait_extraction(detector, decoded, request)?;
    to_api_result(detector.name(), decoded, &result, options)
}

fn to_api_result(
    detector_name: &str,
    decoded: &DecodedImage,
    result: &CropResult,
    options: &RustCropOptions,
) -> MlResult<ExtractPortraitsResult> {
    let jpeg = EncodedImageFormat::Jpeg {
        quality: options.jpeg_quality.clamp(1, 100),
    };

    let portraits = result
        .crops
        .iter()
        .map(|crop| {
            Ok(RustPortrait {
                detection_box: to_api_rect(crop.detection.rect),
                crop_box: to_api_rect(crop.rect),
                score: f64::from(crop.detection.confidence),
                jpeg: encode_decoded(&crop.image, jpeg)?,
            })
        })
        .collect::<MlResult<Vec<_>>>()?;

    let overlay_jpeg = if options.render_overlay {
        let boxes: Vec<Rect> = result.crops.iter().map(|c| c.detection.rect).collect();
        let overlay = draw_detection_overlay(decoded, &boxes)?;
        Some(encode_decoded(&overlay, jpeg)?)
    } else {
        None
    };

    let no_faces_found = result.is_empty();
    Ok(ExtractPortraitsResult {
        decoded_image_size: RustDimensions {
            width: decoded.dimensions.width,
            height: decoded.dimensions.height,
        },
        detector: detector_name.to_string(),
        portraits,
        overlay_jpeg,
        no_faces_found,
        message: no_faces_found.then(|| NO_FACES_MESSAGE.to_string()),
    })
}

pub fn to_crop_request(options: &RustCropOptions) -> MlResult<CropRequest> {
    if !options.min_confidence.is_finite() || !options.margin_pct.is_finite() {
        return Err(MlError::InvalidRequest(
            "non-finite values are not allowed".to_string(),
        ));
    }
    let request = CropRequest {
        min_confidence: options.min_confidence as f32,
        margin_pct: options.margin_pct as f32,
        mode: match options.mode {
            RustSelectionMode::LargestOnly => SelectionMode::Largest,
            RustSelectionMode::AllFaces => SelectionMode::All,
        },
        max_faces: options.max_faces as usize,
    };
    request.validate()?;
    Ok(request)
}

fn to_api_rect(rect: Rect) -> RustRect {
    RustRect {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

fn to_runtime_config(config: &RustPortraitRuntimeConfig) -> DetectorRuntimeConfig {
    DetectorRuntimeConfig {
        model_paths: DetectorModelPaths {
            neural: optional_path(&config.model_paths.neural_model_path),
            cascade: optional_path(&config.model_paths.cascade_model_path),
        },
        provider_policy: ExecutionProviderPolicy {
            prefer_coreml: config.provider_policy.prefer_coreml,
            prefer_nnapi: config.provider_policy.prefer_nnapi,
            prefer_xnnpack: config.provider_policy.prefer_xnnpack,
            allow_cpu_fallback: config.provider_policy.allow_cpu_fallback,
        },
    }
}

fn optional_path(path: &str) -> Option<String> {
    let trimmed = path.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
