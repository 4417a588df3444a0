//! Unified background removal processor
//!
//! `BackgroundRemovalProcessor` owns the configuration, the backend factory,
//! the model directory and the session cache. Every entry point (library
//! functions, web handlers) goes through it so all modes share one pipeline:
//! normalize, optionally enhance, segment and matte each model pass, restore
//! the original size, blend, refine edges and encode.

use crate::{
    cache::ModelCache,
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    image_processing,
    inference::{validate_prediction, BackendFactory, DefaultBackendFactory},
    matting,
    mode::{MattingParams, ModelPass, ProcessingMode, FEATHER_PASS},
    models::SegmentationModel,
    services::ImageIOService,
    session_cache::{SessionCache, SessionCacheStats, SharedBackend},
    types::{ProcessingTimings, RemovalResult},
    utils::ImagePreprocessor,
};
use image::{DynamicImage, GenericImageView, GrayImage, RgbaImage};
use instant::Instant;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info as trace_info, instrument, span, Level};

/// How the input is prepared and the alpha finished for one run
#[derive(Debug, Clone, Copy)]
struct Strategy<'a> {
    passes: &'a [ModelPass],
    enhance_input: bool,
    alpha_sigma: f32,
}

/// Background removal processor shared by the library API and the web layer
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    backend_factory: Arc<dyn BackendFactory>,
    model_cache: ModelCache,
    sessions: SessionCache,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("backend", &self.backend_factory.name())
            .field("model_dir", &self.model_cache.get_current_cache_dir())
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor with the default backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model directory cannot be resolved or created
    pub fn new(config: RemovalConfig) -> Result<Self> {
        let model_cache = ModelCache::from_config_dir(config.model_dir.as_deref())?;
        Self::with_factory(config, Arc::new(DefaultBackendFactory), model_cache)
    }

    /// Create a processor with a custom backend factory and model directory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: RemovalConfig,
        backend_factory: Arc<dyn BackendFactory>,
        model_cache: ModelCache,
    ) -> Result<Self> {
        config.validate()?;
        debug!(
            "Processor using backend '{}' with models in {}",
            backend_factory.name(),
            model_cache.get_current_cache_dir().display()
        );

        Ok(Self {
            config,
            backend_factory,
            model_cache,
            sessions: SessionCache::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn model_cache(&self) -> &ModelCache {
        &self.model_cache
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend_factory.name()
    }

    /// Whether the backend reads model files that must be present on disk
    #[must_use]
    pub fn requires_model_files(&self) -> bool {
        self.backend_factory.requires_model_files()
    }

    #[must_use]
    pub fn session_stats(&self) -> SessionCacheStats {
        self.sessions.stats()
    }

    /// Remove the background of the file at `input_path` and write a PNG
    ///
    /// The output extension is forced to `.png`; the returned path is the
    /// file actually written.
    ///
    /// # Errors
    /// - Input decoding failures
    /// - Model loading or inference errors
    /// - PNG encoding or write failures (no file is created)
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
        mode: ProcessingMode,
    ) -> Result<PathBuf> {
        let (image, decode_ms) = Self::load_timed(input_path.as_ref())?;
        let mut result = self.process_image(&image, mode)?;
        result.timings.image_decode_ms = decode_ms;
        Self::save_result(&mut result, input_path.as_ref(), output_path.as_ref())
    }

    /// Feathered single-model cutout of a file, written as PNG
    ///
    /// # Errors
    /// - Same as [`BackgroundRemovalProcessor::process_file`]
    pub fn process_file_with_feather<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
        feather_sigma: f32,
    ) -> Result<PathBuf> {
        let (image, decode_ms) = Self::load_timed(input_path.as_ref())?;
        let mut result = self.process_image_with_feather(&image, feather_sigma)?;
        result.timings.image_decode_ms = decode_ms;
        Self::save_result(&mut result, input_path.as_ref(), output_path.as_ref())
    }

    fn load_timed(input_path: &Path) -> Result<(DynamicImage, u64)> {
        let decode_start = Instant::now();
        let image = ImageIOService::load_image(input_path)?;
        Ok((image, decode_start.elapsed().as_millis() as u64))
    }

    fn save_result(result: &mut RemovalResult, input_path: &Path, output_path: &Path) -> Result<PathBuf> {
        let output_path = ImageIOService::force_png_extension(output_path);
        result.save_png(&output_path)?;
        trace_info!(
            input = %input_path.display(),
            output = %output_path.display(),
            summary = %result.timing_summary(),
            "Background removed"
        );
        Ok(output_path)
    }

    /// Remove the background of an in-memory image with the given mode
    ///
    /// # Errors
    /// - Model loading or inference errors
    /// - Matting or blending failures
    #[instrument(
        skip(self, image),
        fields(
            mode = %mode,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&self, image: &DynamicImage, mode: ProcessingMode) -> Result<RemovalResult> {
        let strategy = Strategy {
            passes: mode.passes(),
            enhance_input: mode.enhances_input(),
            alpha_sigma: self.config.edge_refine_sigma,
        };
        let mut result = self.run(image, strategy)?;
        result.mode = Some(mode);
        Ok(result)
    }

    /// Single isnet pass with best parameters and a feathered alpha
    ///
    /// No upscaling or sharpening is applied. `feather_sigma <= 0` leaves the
    /// matted alpha untouched.
    ///
    /// # Errors
    /// - Model loading or inference errors
    #[instrument(skip(self, image), fields(dimensions = %format!("{}x{}", image.width(), image.height())))]
    pub fn process_image_with_feather(&self, image: &DynamicImage, feather_sigma: f32) -> Result<RemovalResult> {
        if !feather_sigma.is_finite() {
            return Err(BgRemovalError::config_value_error(
                "feather sigma",
                feather_sigma,
                "finite, >= 0",
                Some(crate::mode::DEFAULT_FEATHER_SIGMA),
            ));
        }
        self.run(
            image,
            Strategy {
                passes: std::slice::from_ref(&FEATHER_PASS),
                enhance_input: false,
                alpha_sigma: feather_sigma,
            },
        )
    }

    fn run(&self, image: &DynamicImage, strategy: Strategy<'_>) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let original_dimensions = image.dimensions();
        if original_dimensions.0 == 0 || original_dimensions.1 == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "input",
                "image has no pixels",
                Some(&format!("{}x{}", original_dimensions.0, original_dimensions.1)),
            ));
        }

        let normalized = image_processing::normalize_color(image.clone());

        let working = {
            let _span = span!(Level::DEBUG, "enhancement", enabled = strategy.enhance_input).entered();
            let start = Instant::now();
            let working = if strategy.enhance_input {
                self.enhance(normalized)?
            } else {
                normalized
            };
            timings.enhancement_ms = start.elapsed().as_millis() as u64;
            working
        };

        let mut cutouts = Vec::with_capacity(strategy.passes.len());
        for pass in strategy.passes {
            let mask = {
                let _span = span!(Level::INFO, "segmentation", model = %pass.model).entered();
                let start = Instant::now();
                let mask = self.segment(&working, pass.model)?;
                timings.segmentation_ms += start.elapsed().as_millis() as u64;
                mask
            };

            let cutout = {
                let _span = span!(Level::DEBUG, "matting", model = %pass.model).entered();
                let start = Instant::now();
                let cutout = self.cutout(&working, &mask, &pass.matting)?;
                timings.matting_ms += start.elapsed().as_millis() as u64;
                cutout
            };
            cutouts.push(cutout);
        }

        let image = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            let start = Instant::now();
            let image = Self::finish(cutouts, original_dimensions, strategy.alpha_sigma)?;
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            image
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        Ok(RemovalResult {
            image,
            mode: None,
            original_dimensions,
            models: strategy.passes.iter().map(|pass| pass.model).collect(),
            timings,
        })
    }

    /// Upscale small inputs and sharpen
    fn enhance(&self, image: DynamicImage) -> Result<DynamicImage> {
        let image = image_processing::upscale_to_min_side(&image, self.config.upscale_min_side)?.unwrap_or(image);
        Ok(image_processing::sharpen(&image, self.config.sharpen_factor))
    }

    /// Run `model` on `image` and decode its mask at the image size
    fn segment(&self, image: &DynamicImage, model: SegmentationModel) -> Result<GrayImage> {
        let model_path = self.model_cache.get_model_path(model);
        if self.backend_factory.requires_model_files() && !self.model_cache.is_model_cached(model) {
            return Err(BgRemovalError::model_error_with_context(
                "load",
                &model_path,
                "model file not found",
                &["enable automatic downloads", "run with --prefetch", "set --model-dir"],
            ));
        }

        let tensor = ImagePreprocessor::preprocess_image(image, &model.preprocessing_config())?;

        let prediction = if self.config.disable_cache {
            let mut backend = self.backend_factory.create_backend(model, &model_path)?;
            backend.initialize(&self.config)?;
            backend.infer(&tensor)?
        } else {
            let shared = self.session(model, &model_path)?;
            let mut backend = shared
                .lock()
                .map_err(|_| BgRemovalError::internal("Inference backend lock poisoned"))?;
            backend.infer(&tensor)?
        };
        validate_prediction(&prediction)?;

        let mask = ImagePreprocessor::prediction_to_mask(&prediction, image.width(), image.height())?;
        Ok(if self.config.post_process_mask {
            matting::post_process_mask(&mask)
        } else {
            mask
        })
    }

    /// Cached session for `model`, rebuilt if a panic poisoned the previous one
    fn session(&self, model: SegmentationModel, model_path: &Path) -> Result<SharedBackend> {
        let factory = self.backend_factory.as_ref();
        let shared = self.sessions.get_or_create(model, model_path, factory, &self.config)?;
        if !shared.is_poisoned() {
            return Ok(shared);
        }
        warn!("Session for {} was poisoned by a panic, reloading it", model);
        self.sessions.evict(model, &shared);
        self.sessions.get_or_create(model, model_path, factory, &self.config)
    }

    /// Matte the mask, falling back to a naive cutout when matting cannot run
    fn cutout(&self, image: &DynamicImage, mask: &GrayImage, params: &MattingParams) -> Result<RgbaImage> {
        if self.config.alpha_matting {
            match matting::alpha_matting_cutout(&image.to_rgb8(), mask, params) {
                Ok(cutout) => return Ok(cutout),
                Err(e) => warn!("Alpha matting failed, using naive cutout: {}", e),
            }
        }
        matting::naive_cutout(&image.to_rgba8(), mask)
    }

    /// Restore size, blend passes by maximum alpha and soften the alpha
    fn finish(cutouts: Vec<RgbaImage>, original_dimensions: (u32, u32), alpha_sigma: f32) -> Result<RgbaImage> {
        let (width, height) = original_dimensions;
        let mut restored = cutouts
            .into_iter()
            .map(|cutout| image_processing::resize_rgba_premultiplied(&cutout, width, height));

        let first = restored
            .next()
            .ok_or_else(|| BgRemovalError::internal("No segmentation pass produced a cutout"))?;
        let mut blended = restored.try_fold(first, |acc, next| image_processing::blend_max_alpha(&acc, &next))?;

        image_processing::blur_alpha(&mut blended, alpha_sigma);
        Ok(blended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackendFactory;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn processor(config: RemovalConfig, factory: Arc<MockBackendFactory>) -> (BackgroundRemovalProcessor, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let processor = BackgroundRemovalProcessor::with_factory(config, factory, cache).unwrap();
        (processor, temp_dir)
    }

    fn small_config() -> RemovalConfig {
        RemovalConfig::builder().upscale_min_side(64).build().unwrap()
    }

    fn test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_every_mode_preserves_dimensions() {
        let factory = Arc::new(MockBackendFactory::new());
        let (processor, _dir) = processor(small_config(), factory);

        for mode in ProcessingMode::ALL {
            let result = processor.process_image(&test_image(48, 30), mode).unwrap();
            assert_eq!(result.dimensions(), (48, 30), "{mode}");
            assert_eq!(result.original_dimensions, (48, 30));
            assert_eq!(result.mode, Some(mode));
            assert_eq!(result.models, mode.passes().iter().map(|p| p.model).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_sessions_are_reused() {
        let factory = Arc::new(MockBackendFactory::new());
        let (processor, _dir) = processor(small_config(), Arc::clone(&factory));

        processor.process_image(&test_image(32, 32), ProcessingMode::Fast).unwrap();
        processor.process_image(&test_image(32, 32), ProcessingMode::Fast).unwrap();
        assert_eq!(factory.created_count(), 1);
        assert_eq!(factory.inference_calls(), 2);
        assert_eq!(processor.session_stats().cache_hits, 1);
    }

    #[test]
    fn test_poisoned_session_recovers() {
        let factory = Arc::new(MockBackendFactory::new());
        let (processor, _dir) = processor(small_config(), Arc::clone(&factory));
        processor.process_image(&test_image(32, 32), ProcessingMode::Fast).unwrap();

        let shared = processor
            .sessions
            .get_or_create(
                SegmentationModel::U2netp,
                Path::new("unused.onnx"),
                factory.as_ref(),
                processor.config(),
            )
            .unwrap();
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("backend panicked mid-inference");
        })
        .join();

        let result = processor.process_image(&test_image(32, 32), ProcessingMode::Fast).unwrap();
        assert_eq!(result.dimensions(), (32, 32));
        assert_eq!(factory.created_count(), 2);
        assert_eq!(processor.session_stats().total_sessions, 1);
    }

    #[test]
    fn test_disabled_cache_creates_backend_per_call() {
        let factory = Arc::new(MockBackendFactory::new());
        let config = RemovalConfig::builder()
            .upscale_min_side(64)
            .disable_cache(true)
            .build()
            .unwrap();
        let (processor, _dir) = processor(config, Arc::clone(&factory));

        processor.process_image(&test_image(32, 32), ProcessingMode::Advanced).unwrap();
        processor.process_image(&test_image(32, 32), ProcessingMode::Advanced).unwrap();
        assert_eq!(factory.created_count(), 4);
        assert_eq!(processor.session_stats().total_sessions, 0);
    }

    #[test]
    fn test_mock_subject_is_kept_and_corners_removed() {
        let factory = Arc::new(MockBackendFactory::new());
        let (processor, _dir) = processor(small_config(), factory);

        let result = processor.process_image(&test_image(64, 64), ProcessingMode::Fast).unwrap();
        assert_eq!(result.image.get_pixel(32, 32)[3], 255);
        assert_eq!(result.image.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_naive_cutout_without_alpha_matting() {
        let factory = Arc::new(MockBackendFactory::new());
        let config = RemovalConfig::builder()
            .upscale_min_side(64)
            .alpha_matting(false)
            .edge_refine_sigma(0.0)
            .build()
            .unwrap();
        let (processor, _dir) = processor(config, factory);

        let result = processor.process_image(&test_image(64, 64), ProcessingMode::Fast).unwrap();
        assert_eq!(result.image.get_pixel(32, 32)[3], 255);
        assert_eq!(result.image.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_feather_uses_isnet_only() {
        let factory = Arc::new(MockBackendFactory::new());
        let (processor, _dir) = processor(small_config(), factory);

        let result = processor.process_image_with_feather(&test_image(40, 40), 2.0).unwrap();
        assert_eq!(result.models, vec![SegmentationModel::IsnetGeneralUse]);
        assert_eq!(result.mode, None);
        assert!(processor.process_image_with_feather(&test_image(4, 4), f32::NAN).is_err());
    }

    #[test]
    fn test_inference_failure_propagates() {
        let factory = Arc::new(MockBackendFactory::failing());
        let (processor, _dir) = processor(small_config(), factory);

        let err = processor.process_image(&test_image(16, 16), ProcessingMode::Portrait).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }

    #[test]
    fn test_extreme_aspect_ratio_fails_before_upscaling() {
        let factory = Arc::new(MockBackendFactory::new());
        let (processor, _dir) = processor(small_config(), Arc::clone(&factory));

        let sliver = DynamicImage::ImageRgb8(RgbImage::new(1, 2_000_000));
        let err = processor.process_image(&sliver, ProcessingMode::Best).unwrap_err();
        assert!(matches!(err, BgRemovalError::Processing(_)));
        assert_eq!(factory.inference_calls(), 0);
    }

    #[test]
    fn test_process_file_forces_png() {
        let factory = Arc::new(MockBackendFactory::new());
        let (processor, dir) = processor(small_config(), factory);

        let input = dir.path().join("photo.jpg");
        test_image(20, 12).to_rgb8().save(&input).unwrap();

        let written = processor
            .process_file(&input, dir.path().join("out").join("photo.jpg"), ProcessingMode::Fast)
            .unwrap();
        assert_eq!(written, dir.path().join("out").join("photo.png"));

        let decoded = image::open(&written).unwrap();
        assert_eq!(decoded.dimensions(), (20, 12));
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
    }

    #[test]
    fn test_missing_model_file_for_file_backed_factory() {
        struct FileBacked(MockBackendFactory);
        impl BackendFactory for FileBacked {
            fn create_backend(
                &self,
                model: SegmentationModel,
                model_path: &Path,
            ) -> Result<Box<dyn crate::inference::InferenceBackend>> {
                self.0.create_backend(model, model_path)
            }
            fn name(&self) -> &'static str {
                "file-backed"
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let processor = BackgroundRemovalProcessor::with_factory(
            small_config(),
            Arc::new(FileBacked(MockBackendFactory::new())),
            cache,
        )
        .unwrap();

        let err = processor.process_image(&test_image(8, 8), ProcessingMode::Fast).unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));

        std::fs::write(temp_dir.path().join("u2netp.onnx"), b"weights").unwrap();
        assert!(processor.process_image(&test_image(8, 8), ProcessingMode::Fast).is_ok());
    }
}
