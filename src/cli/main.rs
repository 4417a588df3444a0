//! Background removal web server CLI
//!
//! Parses arguments, sets up tracing and either runs one of the maintenance
//! commands (`--list-models`, `--show-providers`) or serves the front-end.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache},
    download::ModelDownloader,
    models::SegmentationModel,
    processor::BackgroundRemovalProcessor,
    tracing_config::{TracingConfig, TracingFormat},
    utils::ExecutionProviderManager,
    web::{AppState, WebServer},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info as trace_info};

/// Web front-end for background removal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-web")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "BGREMOVE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on (0 = pick a free port)
    #[arg(short, long, env = "BGREMOVE_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Static root; uploads are stored under <STATIC_DIR>/uploads
    #[arg(long, env = "BGREMOVE_STATIC_DIR", value_name = "PATH", default_value = "static")]
    pub static_dir: PathBuf,

    /// Directory holding the ONNX model files
    #[arg(long, env = "BGREMOVE_MODEL_DIR", value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Execution provider (auto, cpu, cuda, coreml; optional "onnx:" prefix)
    #[arg(short, long, env = "BGREMOVE_EXECUTION_PROVIDER", default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, env = "BGREMOVE_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Load a fresh inference session for every request
    #[arg(long, env = "BGREMOVE_NO_SESSION_CACHE")]
    pub no_session_cache: bool,

    /// Never download missing models
    #[arg(long, env = "BGREMOVE_NO_DOWNLOAD")]
    pub no_download: bool,

    /// Use the plain mask as alpha instead of alpha matting
    #[arg(long, env = "BGREMOVE_NO_ALPHA_MATTING")]
    pub no_alpha_matting: bool,

    /// Mirror to download model files from (<URL>/<model>.onnx)
    #[arg(long, env = "BGREMOVE_MODEL_BASE_URL", value_name = "URL")]
    pub model_base_url: Option<String>,

    /// Download every model before serving
    #[arg(long, env = "BGREMOVE_PREFETCH")]
    pub prefetch: bool,

    /// List models and their cache status, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Increase verbosity (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, env = "BGREMOVE_LOG_FORMAT", value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into())
        .init()
        .context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli)?;

    if cli.list_models {
        return list_models(config.removal.model_dir.as_deref());
    }

    let processor = Arc::new(
        BackgroundRemovalProcessor::new(config.removal.clone()).context("Failed to create processor")?,
    );
    debug!(processor = ?processor, "Processor ready");

    let downloader = if config.auto_download || cli.prefetch {
        let mut downloader = ModelDownloader::new(processor.model_cache().clone())?;
        if let Some(base_url) = &cli.model_base_url {
            downloader = downloader.with_base_url(base_url);
        }
        Some(Arc::new(downloader))
    } else {
        None
    };

    if cli.prefetch {
        if let Some(downloader) = &downloader {
            let paths = downloader
                .ensure_models(&SegmentationModel::ALL)
                .await
                .context("Failed to prefetch models")?;
            info!("Prefetched {} models", paths.len());
        }
    }

    let downloader = if config.auto_download { downloader } else { None };
    let state = AppState::new(config.clone(), processor, downloader).context("Failed to prepare static folders")?;
    let server = WebServer::bind(&config, state).await?;

    trace_info!(
        address = %server.local_addr()?,
        static_dir = %config.static_dir.display(),
        auto_download = config.auto_download,
        "Starting bgremove-web"
    );
    server.run().await?;
    Ok(())
}

/// Display execution provider diagnostics
fn show_provider_diagnostics() {
    println!("Execution Provider Diagnostics");
    println!("==============================");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected\n");

    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "available"
        } else {
            "not available"
        };
        println!(
            "  {:<12} {:<14} {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\nUsage:");
    println!("  --execution-provider onnx:auto    # best available provider (default)");
    println!("  --execution-provider onnx:cuda    # NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Apple CoreML");
    println!("  --execution-provider onnx:cpu     # force CPU");
}

/// List every model with its download status
fn list_models(model_dir: Option<&std::path::Path>) -> Result<()> {
    let cache = ModelCache::from_config_dir(model_dir).context("Failed to open model directory")?;
    let cached = cache.scan_cached_models().context("Failed to scan model directory")?;

    println!("Models in {}", cache.get_current_cache_dir().display());
    for model in SegmentationModel::ALL {
        let status = cached
            .iter()
            .find(|info| info.model == model)
            .map_or_else(|| "not downloaded".to_string(), |info| format_size(info.size_bytes));
        println!(
            "  {:<18} {:>5}px  {:<16} {}",
            model.id(),
            model.input_size(),
            status,
            model.description()
        );
    }
    Ok(())
}
