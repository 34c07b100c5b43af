use std::sync::Mutex;

use log::{info, warn};
use once_cell::sync::Lazy;

#[cfg(feature = "cascade")]
use crate::ml::face::cascade::CascadeFaceDetector;
use crate::ml::{
    error::{MlError, MlResult},
    face::{detect::YoloFaceDetector, detector::FaceDetector},
    types::{DecodedImage, Detection},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionProviderPolicy {
    pub prefer_coreml: bool,
    pub prefer_nnapi: bool,
    pub prefer_xnnpack: bool,
    pub allow_cpu_fallback: bool,
}

impl Default for ExecutionProviderPolicy {
    fn default() -> Self {
        Self {
            prefer_coreml: true,
            prefer_nnapi: true,
            prefer_xnnpack: false,
            allow_cpu_fallback: true,
        }
    }
}

impl ExecutionProviderPolicy {
    /// Plain CPU execution, the last resort when accelerators fail to load.
    pub fn cpu_only() -> Self {
        Self {
            prefer_coreml: false,
            prefer_nnapi: false,
            prefer_xnnpack: false,
            allow_cpu_fallback: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectorModelPaths {
    /// YOLO-face ONNX model.
    pub neural: Option<String>,
    /// SeetaFace cascade model (`seeta_fd_frontal_v1.0.bin`).
    pub cascade: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectorRuntimeConfig {
    pub model_paths: DetectorModelPaths,
    pub provider_policy: ExecutionProviderPolicy,
}

/// The backend picked for the lifetime of the runtime.
pub enum DetectorBackend {
    Neural(YoloFaceDetector),
    #[cfg(feature = "cascade")]
    Cascade(CascadeFaceDetector),
}

impl FaceDetector for DetectorBackend {
    fn name(&self) -> &'static str {
        match self {
            DetectorBackend::Neural(detector) => detector.name(),
            #[cfg(feature = "cascade")]
            DetectorBackend::Cascade(detector) => detector.name(),
        }
    }

    fn detect(&self, image: &DecodedImage, min_confidence: f32) -> MlResult<Vec<Detection>> {
        match self {
            DetectorBackend::Neural(detector) => detector.detect(image, min_confidence),
            #[cfg(feature = "cascade")]
            DetectorBackend::Cascade(detector) => detector.detect(image, min_confidence),
        }
    }
}

struct RuntimeState {
    config: DetectorRuntimeConfig,
    backend: DetectorBackend,
}

static GLOBAL_RUNTIME: Lazy<Mutex<Option<RuntimeState>>> = Lazy::new(|| Mutex::new(None));

/// Loads the first backend that is available, neural model first.
pub fn select_backend(config: &DetectorRuntimeConfig) -> MlResult<DetectorBackend> {
    let mut failures = Vec::new();

    if let Some(path) = non_empty(config.model_paths.neural.as_deref()) {
        match YoloFaceDetector::load(path, &config.provider_policy) {
            Ok(detector) => {
                info!("face detection backend: yolo-face ({path})");
                return Ok(DetectorBackend::Neural(detector));
            }
            Err(error) => {
                warn!("neural face detector unavailable, trying next backend: {error}");
                failures.push(error.to_string());
            }
        }
    }

    if let Some(path) = non_empty(config.model_paths.cascade.as_deref()) {
        match load_cascade(path) {
            Ok(backend) => {
                info!("face detection backend: seetaface-cascade ({path})");
                return Ok(backend);
            }
            Err(error) => {
                warn!("cascade face detector unavailable: {error}");
                failures.push(error.to_string());
            }
        }
    }

    if failures.is_empty() {
        return Err(MlError::DetectionUnavailable(
            "no face detection model configured".to_string(),
        ));
    }
    Err(MlError::DetectionUnavailable(failures.join(" | ")))
}

#[cfg(feature = "cascade")]
fn load_cascade(path: &str) -> MlResult<DetectorBackend> {
    CascadeFaceDetector::load(path).map(DetectorBackend::Cascade)
}

#[cfg(not(feature = "cascade"))]
fn load_cascade(path: &str) -> MlResult<DetectorBackend> {
    let _ = path;
    Err(MlError::DetectionUnavailable(
        "cascade detection is unavailable because the `cascade` cargo feature is disabled"
            .to_string(),
    ))
}

fn non_empty(path: Option<&str>) -> Option<&str> {
    path.map(str::trim).filter(|p| !p.is_empty())
}

fn lock_runtime() -> std::sync::MutexGuard<'static, Option<RuntimeState>> {
    match GLOBAL_RUNTIME.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            // A panic mid-request may have left a half-built backend behind.
            let mut guard = poisoned.into_inner();
            *guard = None;
            guard
        }
    }
}

pub fn ensure_runtime(config: &DetectorRuntimeConfig) -> MlResult<()> {
    let should_rebuild = {
        let guard = lock_runtime();
        match guard.as_ref() {
            Some(existing) => existing.config != *config,
            None => true,
        }
    };

    if should_rebuild {
        let backend = select_backend(config)?;
        let mut guard = lock_runtime();
        *guard = Some(RuntimeState {
            config: config.clone(),
            backend,
        });
    }
    Ok(())
}

pub fn with_detector<F, R>(config: &DetectorRuntimeConfig, func: F) -> MlResult<R>
where
    F: FnOnce(&DetectorBackend) -> MlResult<R>,
{
    ensure_runtime(config)?;
    let guard = lock_runtime();
    let state = guard
        .as_ref()
        .ok_or_else(|| MlError::Runtime("runtime is not initialized".to_string()))?;
    func(&state.backend)
}

pub fn active_backend_name() -> Option<&'static str> {
    lock_runtime().as_ref().map(|state| state.backend.name())
}

pub fn release_runtime() -> MlResult<()> {
    let mut guard = lock_runtime();
    *guard = None;
    Ok(())
}
