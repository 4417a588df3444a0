//! ONNX Runtime backend implementation for segmentation models
//!
//! Builds one ONNX Runtime session per model file with the requested execution
//! provider (CPU, CUDA, `CoreML`) and runs the first model output as the
//! foreground prediction.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::SegmentationModel;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// ONNX Runtime backend for one segmentation model
#[derive(Debug)]
pub struct OnnxBackend {
    model: SegmentationModel,
    model_path: PathBuf,
    session: Option<Session>,
    initialized: bool,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers with availability status and descriptions
    ///
    /// Returns `(name, available, description)` tuples.
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!(
            "Platform: {os}/{arch}, {cores} CPU cores",
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            cores = std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        );

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a backend for `model` reading weights from `model_path`
    #[must_use]
    pub fn new(model: SegmentationModel, model_path: PathBuf) -> Self {
        Self {
            model,
            model_path,
            session: None,
            initialized: false,
        }
    }

    fn configure_providers(
        session_builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let cuda_available =
            || OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available = || {
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false)
        };

        let builder = match provider {
            ExecutionProvider::Auto => {
                // Auto-detect: try CUDA > CoreML > CPU with availability checking
                let mut providers = Vec::new();
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }

                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                    session_builder
                } else {
                    session_builder
                        .with_execution_providers(providers)
                        .map_err(|e| {
                            BgRemovalError::inference(format!(
                                "Failed to set auto execution providers: {e}"
                            ))
                        })?
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                session_builder
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    session_builder
                        .with_execution_providers([CUDAExecutionProvider::default().build()])
                        .map_err(|e| {
                            BgRemovalError::inference(format!(
                                "Failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    session_builder
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    session_builder
                        .with_execution_providers([CoreMLExecutionProvider::default()
                            .with_subgraphs(true)
                            .build()])
                        .map_err(|e| {
                            BgRemovalError::inference(format!(
                                "Failed to set CoreML execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                    session_builder
                }
            },
        };

        Ok(builder)
    }

    /// Load and initialize the ONNX model
    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let model_data = std::fs::read(&self.model_path).map_err(|e| {
            BgRemovalError::model_error_with_context(
                "read",
                &self.model_path,
                &e.to_string(),
                &["start the server without --no-download", "run with --prefetch"],
            )
        })?;

        let session_builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let session_builder = Self::configure_providers(session_builder, config.execution_provider)?;

        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| BgRemovalError::inference(format!("Failed to enable parallel execution: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgRemovalError::model_error_with_context(
                    "load",
                    &self.model_path,
                    &e.to_string(),
                    &["delete the file so it is downloaded again"],
                )
            })?;

        log::debug!(
            "ONNX Runtime session for {} created: provider {:?}, {intra_threads} intra-op / {inter_threads} inter-op threads, {:.2} MB",
            self.model,
            config.execution_provider,
            model_data.len() as f64 / (1024.0 * 1024.0)
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Loaded model {} in {:.0}ms",
            self.model,
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs: the rembg exports name their input differently per model
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let output_shape = output_tensor.shape().to_vec();
        let output_data = output_tensor.view().to_owned().into_raw_vec_and_offset().0;

        let result = match output_shape.as_slice() {
            [n, c, h, w] => Array4::from_shape_vec((*n, *c, *h, *w), output_data),
            [n, h, w] => Array4::from_shape_vec((*n, 1, *h, *w), output_data),
            other => {
                return Err(BgRemovalError::inference(format!(
                    "Expected 3D or 4D output tensor, got {}D",
                    other.len()
                )))
            },
        }
        .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Inference with {} took {:.2}ms (output {:?})",
            self.model,
            inference_start.elapsed().as_secs_f64() * 1000.0,
            result.dim()
        );

        Ok(result)
    }

    fn model(&self) -> SegmentationModel {
        self.model
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_backend_is_uninitialized() {
        let backend = OnnxBackend::new(SegmentationModel::U2netp, PathBuf::from("u2netp.onnx"));
        assert!(!backend.is_initialized());
        assert_eq!(backend.model(), SegmentationModel::U2netp);
    }

    #[test]
    fn test_missing_model_file_is_a_model_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut backend = OnnxBackend::new(
            SegmentationModel::U2net,
            temp_dir.path().join("missing.onnx"),
        );
        let err = backend.initialize(&RemovalConfig::default()).unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = OnnxBackend::new(SegmentationModel::U2net, PathBuf::from("u2net.onnx"));
        let input = Array4::<f32>::zeros((1, 3, 320, 320));
        assert!(backend.infer(&input).is_err());
    }

    #[test]
    fn test_list_providers_always_reports_cpu() {
        let providers = OnnxBackend::list_providers();
        assert!(providers
            .iter()
            .any(|(name, available, _)| name == "CPU" && *available));
    }
}
