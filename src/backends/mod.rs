//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (high performance, GPU acceleration)
//! - Mock backend (synthetic segmentation for tests and offline runs)

#[cfg(feature = "onnx")]
pub mod onnx;

pub mod mock;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

pub use self::mock::{MockBackend, MockBackendFactory};
