//! Mock backend implementation for testing and offline runs

use crate::config::RemovalConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::{BackendFactory, InferenceBackend};
use crate::models::SegmentationModel;
use instant::Duration;
use ndarray::Array4;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock backend producing a deterministic synthetic segmentation
///
/// The prediction is a centered ellipse covering roughly the middle half of
/// the frame with a soft falloff at its border, which gives the matting stage
/// a realistic mix of confident and uncertain pixels. No model file is read.
#[derive(Debug)]
pub struct MockBackend {
    model: SegmentationModel,
    initialized: bool,
    fail_inference: bool,
    inference_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a new mock backend for `model`
    #[must_use]
    pub fn new(model: SegmentationModel) -> Self {
        Self {
            model,
            initialized: false,
            fail_inference: false,
            inference_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock backend whose inference always fails
    #[must_use]
    pub fn new_failing_inference(model: SegmentationModel) -> Self {
        let mut backend = Self::new(model);
        backend.fail_inference = true;
        backend
    }

    fn with_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.inference_calls = counter;
        self
    }

    /// Number of `infer` calls made on this backend
    #[must_use]
    pub fn inference_calls(&self) -> usize {
        self.inference_calls.load(Ordering::Relaxed)
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(0)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }
        self.inference_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_inference {
            return Err(BgRemovalError::inference(format!(
                "mock inference failure for model '{}'",
                self.model
            )));
        }

        let (n, _c, h, w) = input.dim();
        let center_x = w as f32 / 2.0;
        let center_y = h as f32 / 2.0;
        let radius_x = (w as f32 * 0.35).max(1.0);
        let radius_y = (h as f32 * 0.4).max(1.0);

        let output = Array4::from_shape_fn((n, 1, h, w), |(_, _, y, x)| {
            let dx = (x as f32 + 0.5 - center_x) / radius_x;
            let dy = (y as f32 + 0.5 - center_y) / radius_y;
            let distance = (dx * dx + dy * dy).sqrt();
            // Linear falloff from 0.9 to 1.1 of the ellipse radius
            ((1.1 - distance) / 0.2).clamp(0.0, 1.0)
        });

        Ok(output)
    }

    fn model(&self) -> SegmentationModel {
        self.model
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory building [`MockBackend`]s, counting creations and inference calls
#[derive(Debug, Clone, Default)]
pub struct MockBackendFactory {
    created: Arc<AtomicUsize>,
    inference_calls: Arc<AtomicUsize>,
    fail_inference: bool,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose backends fail every inference call
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_inference: true,
            ..Self::default()
        }
    }

    /// Number of backends created so far
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Inference calls made across every backend created by this factory
    #[must_use]
    pub fn inference_calls(&self) -> usize {
        self.inference_calls.load(Ordering::Relaxed)
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        model: SegmentationModel,
        _model_path: &Path,
    ) -> Result<Box<dyn InferenceBackend>> {
        self.created.fetch_add(1, Ordering::Relaxed);
        let backend = if self.fail_inference {
            MockBackend::new_failing_inference(model)
        } else {
            MockBackend::new(model)
        };
        Ok(Box::new(
            backend.with_counter(Arc::clone(&self.inference_calls)),
        ))
    }

    fn requires_model_files(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_prediction_shape_and_range() {
        let mut backend = MockBackend::new(SegmentationModel::U2netp);
        backend.initialize(&RemovalConfig::default()).unwrap();

        let input = Array4::<f32>::zeros((1, 3, 32, 48));
        let output = backend.infer(&input).unwrap();
        assert_eq!(output.dim(), (1, 1, 32, 48));
        assert!(output.iter().all(|v| (0.0..=1.0).contains(v)));

        // Center is foreground, corners are background
        assert!((output[[0, 0, 16, 24]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);
        assert_eq!(backend.inference_calls(), 1);
    }

    #[test]
    fn test_uninitialized_mock_refuses_inference() {
        let mut backend = MockBackend::new(SegmentationModel::U2net);
        let input = Array4::<f32>::zeros((1, 3, 8, 8));
        assert!(backend.infer(&input).is_err());
    }

    #[test]
    fn test_failing_factory() {
        let factory = MockBackendFactory::failing();
        let mut backend = factory
            .create_backend(SegmentationModel::IsnetGeneralUse, Path::new("unused"))
            .unwrap();
        backend.initialize(&RemovalConfig::default()).unwrap();

        let err = backend.infer(&Array4::<f32>::zeros((1, 3, 8, 8))).unwrap_err();
        assert!(err.to_string().contains("mock inference failure"));
        assert_eq!(factory.inference_calls(), 1);
    }
}
