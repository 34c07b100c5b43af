use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("face detection unavailable: {0}")]
    DetectionUnavailable(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<ort::Error> for MlError {
    fn from(value: ort::Error) -> Self {
        MlError::DetectionUnavailable(format!("onnx runtime: {value}"))
    }
}

impl From<image::ImageError> for MlError {
    fn from(value: image::ImageError) -> Self {
        MlError::Decode(value.to_string())
    }
}
