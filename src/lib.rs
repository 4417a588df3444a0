#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

//! # bgremove-web
//!
//! Background removal behind a small web front-end. Upload an image, pick a
//! quality mode, get back a transparent PNG; or open the manual editor and
//! save a hand-edited cutout.
//!
//! ## Features
//!
//! - **Processing modes**: `fast` (u2netp), `portrait` (u2net human
//!   segmentation), `best` (isnet-general-use) and `advanced` (isnet and u2net
//!   blended by maximum alpha)
//! - **Alpha matting**: trimap from the segmentation mask, guided-filter alpha
//!   and blur-fusion foreground estimation
//! - **Input enhancement**: small images are upscaled and sharpened before
//!   segmentation, then brought back to their original size
//! - **Formats**: PNG, JPEG, WebP, ICO and SVG (rasterized) in, PNG out
//! - **Model management**: on-demand downloads into a local model directory
//! - **Session caching**: one ONNX Runtime session per model, reused across
//!   requests
//! - **Web server**: axum routes mirroring the upload, result and manual
//!   editing flows
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_web::{remove_background, ProcessingMode, RemovalConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::default();
//! let written = remove_background("photo.jpg", "photo_cutout.jpg", ProcessingMode::Fast, &config)?;
//! // The extension is forced to .png
//! assert!(written.ends_with("photo_cutout.png"));
//! # Ok(())
//! # }
//! ```
//!
//! ### Serving the web front-end
//!
//! ```rust,no_run
//! use bgremove_web::{web::{AppState, WebServer}, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::builder().port(8080).build()?;
//! let state = AppState::from_config(config.clone())?;
//! WebServer::bind(&config, state).await?.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Processing Modes
//!
//! | Mode       | Models                  | Input enhancement |
//! |------------|-------------------------|-------------------|
//! | `fast`     | u2netp                  | upscale + sharpen |
//! | `portrait` | u2net_human_seg         | upscale + sharpen |
//! | `best`     | isnet-general-use       | upscale + sharpen |
//! | `advanced` | isnet-general-use, u2net| none              |

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod image_processing;
pub mod inference;
pub mod matting;
pub mod mode;
pub mod models;
pub mod processor;
pub mod services;
pub mod session_cache;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;
pub mod web;

use std::path::{Path, PathBuf};

// Public API exports
pub use backends::{MockBackend, MockBackendFactory};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{ExecutionProvider, RemovalConfig, ServerConfig};
pub use download::ModelDownloader;
pub use error::{BgRemovalError, Result};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use mode::{MattingParams, ProcessingMode};
pub use models::SegmentationModel;
pub use processor::BackgroundRemovalProcessor;
pub use services::ImageIOService;
pub use session_cache::{SessionCache, SessionCacheStats};
pub use types::{ProcessingTimings, RemovalResult};
pub use utils::{ExecutionProviderManager, ImagePreprocessor, ProviderInfo};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};

/// Remove the background of an image file and write a transparent PNG
///
/// The output extension is forced to `.png`, and the returned path is the
/// file actually written. Models must already be present in the model
/// directory; see [`ModelDownloader`] to fetch them.
///
/// # Errors
/// - Input cannot be read or decoded
/// - Model file missing or failing to load
/// - Inference, matting or PNG encoding failures
pub fn remove_background<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    mode: ProcessingMode,
    config: &RemovalConfig,
) -> Result<PathBuf> {
    let processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_file(input_path, output_path, mode)
}

/// Two-model removal: isnet-general-use and u2net blended by maximum alpha
///
/// # Errors
/// - Same as [`remove_background`]
pub fn remove_background_advanced<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    config: &RemovalConfig,
) -> Result<PathBuf> {
    remove_background(input_path, output_path, ProcessingMode::Advanced, config)
}

/// Single isnet pass with a Gaussian-feathered alpha
///
/// `feather_sigma` defaults to [`mode::DEFAULT_FEATHER_SIGMA`].
///
/// # Errors
/// - Same as [`remove_background`]
/// - Non-finite feather sigma
pub fn remove_background_with_feather<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    feather_sigma: Option<f32>,
    config: &RemovalConfig,
) -> Result<PathBuf> {
    let processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_file_with_feather(
        input_path,
        output_path,
        feather_sigma.unwrap_or(mode::DEFAULT_FEATHER_SIGMA),
    )
}

/// Remove the background of an encoded image held in memory
///
/// Accepts every supported input format, SVG included.
///
/// ```rust,no_run
/// use bgremove_web::{remove_background_from_bytes, ProcessingMode, RemovalConfig};
///
/// # fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let result = remove_background_from_bytes(&upload, ProcessingMode::Best, &RemovalConfig::default())?;
/// let png = result.to_png_bytes()?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - Bytes are not a decodable image
/// - Model or inference failures
pub fn remove_background_from_bytes(
    image_bytes: &[u8],
    mode: ProcessingMode,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let processor = BackgroundRemovalProcessor::new(config.clone())?;
    let decode_start = instant::Instant::now();
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    let decode_ms = decode_start.elapsed().as_millis() as u64;

    let mut result = processor.process_image(&image, mode)?;
    result.timings.image_decode_ms = decode_ms;
    Ok(result)
}
