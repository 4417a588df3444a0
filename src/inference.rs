//! Inference backend abstraction and backend factories

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    models::SegmentationModel,
};
use ndarray::Array4;
use std::path::Path;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// One backend instance serves exactly one [`SegmentationModel`]. Backends are
/// moved onto the blocking thread pool and shared behind a mutex by the
/// session cache, hence the `Send` bound.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time on first initialization, `None` when the
    /// backend was already initialized.
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Session creation failures
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor and return the raw prediction
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Unexpected output tensor shape
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Model served by this backend
    fn model(&self) -> SegmentationModel;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend for `model`, reading weights from `model_path`
    ///
    /// # Errors
    /// - Backend not compiled in
    /// - Backend construction failures
    fn create_backend(
        &self,
        model: SegmentationModel,
        model_path: &Path,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// Whether backends built by this factory read model files from disk
    fn requires_model_files(&self) -> bool {
        true
    }

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Default backend factory: ONNX Runtime when the `onnx` feature is enabled
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    #[cfg(feature = "onnx")]
    fn create_backend(
        &self,
        model: SegmentationModel,
        model_path: &Path,
    ) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(crate::backends::OnnxBackend::new(
            model,
            model_path.to_path_buf(),
        )))
    }

    #[cfg(not(feature = "onnx"))]
    fn create_backend(
        &self,
        model: SegmentationModel,
        _model_path: &Path,
    ) -> Result<Box<dyn InferenceBackend>> {
        Err(BgRemovalError::invalid_config(format!(
            "No inference backend available for model '{}'. Rebuild with --features onnx",
            model
        )))
    }

    fn name(&self) -> &'static str {
        if cfg!(feature = "onnx") {
            "onnx"
        } else {
            "none"
        }
    }
}

/// Check the tensor layout every segmentation model produces
///
/// # Errors
/// - Output is empty or has no spatial extent
pub fn validate_prediction(output: &Array4<f32>) -> Result<()> {
    let (batch, channels, height, width) = output.dim();
    if batch == 0 || channels == 0 || height == 0 || width == 0 {
        return Err(BgRemovalError::inference(format!(
            "Model produced an empty prediction with shape {:?}",
            output.dim()
        )));
    }
    Ok(())
}
