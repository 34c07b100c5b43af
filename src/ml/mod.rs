pub mod error;
pub mod face;
pub mod onnx;
pub mod preprocess;
pub mod runtime;
pub mod types;
