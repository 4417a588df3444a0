//! Configuration types for the removal pipeline and the web server

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Maximum accepted request body (16 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{}'. Valid providers: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Load a fresh inference session for every call instead of sharing one per model
    pub disable_cache: bool,

    /// Refine mask edges with alpha matting; plain mask compositing otherwise
    pub alpha_matting: bool,

    /// Clean the raw mask with morphology, blur and threshold before matting
    pub post_process_mask: bool,

    /// Short side the input is upscaled to before segmentation
    pub upscale_min_side: u32,

    /// Sharpness enhancement factor (1.0 = unchanged)
    pub sharpen_factor: f32,

    /// Gaussian sigma of the final alpha edge refinement (0 = disabled)
    pub edge_refine_sigma: f32,

    /// Directory holding the ONNX model files (None = user cache directory)
    pub model_dir: Option<PathBuf>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            disable_cache: false,
            alpha_matting: true,
            post_process_mask: true,
            upscale_min_side: 1024,
            sharpen_factor: 1.2,
            edge_refine_sigma: 0.5,
            model_dir: None,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bgremove_web::{ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .num_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.inter_threads, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero upscale target
    /// - Negative or non-finite sharpen factor or refinement sigma
    pub fn validate(&self) -> Result<()> {
        if self.upscale_min_side == 0 {
            return Err(BgRemovalError::config_value_error(
                "upscale minimum side",
                self.upscale_min_side,
                "1 or more pixels",
                Some(1024),
            ));
        }

        if !self.sharpen_factor.is_finite() || self.sharpen_factor < 0.0 {
            return Err(BgRemovalError::config_value_error(
                "sharpen factor",
                self.sharpen_factor,
                "0.0 or greater",
                Some(1.2),
            ));
        }

        if !self.edge_refine_sigma.is_finite() || self.edge_refine_sigma < 0.0 {
            return Err(BgRemovalError::config_value_error(
                "edge refinement sigma",
                self.edge_refine_sigma,
                "0.0 or greater",
                Some(0.5),
            ));
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both intra and inter threads (inter = half of intra, at least 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.config.alpha_matting = enabled;
        self
    }

    #[must_use]
    pub fn post_process_mask(mut self, enabled: bool) -> Self {
        self.config.post_process_mask = enabled;
        self
    }

    #[must_use]
    pub fn upscale_min_side(mut self, side: u32) -> Self {
        self.config.upscale_min_side = side;
        self
    }

    #[must_use]
    pub fn sharpen_factor(mut self, factor: f32) -> Self {
        self.config.sharpen_factor = factor;
        self
    }

    #[must_use]
    pub fn edge_refine_sigma(mut self, sigma: f32) -> Self {
        self.config.edge_refine_sigma = sigma;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the HTTP front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port (0 = let the OS pick one)
    pub port: u16,
    /// Root of the static tree; uploads live under `<static_dir>/uploads`
    pub static_dir: PathBuf,
    /// Request body cap in bytes
    pub max_upload_bytes: usize,
    /// Fetch missing model files on demand before processing
    pub auto_download: bool,
    /// Pipeline settings shared by every request
    pub removal: RemovalConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: PathBuf::from("static"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            auto_download: true,
            removal: RemovalConfig::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Socket address to bind
    ///
    /// # Errors
    /// - Host is not a valid IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self.host.parse::<std::net::IpAddr>().map_err(|e| {
            BgRemovalError::invalid_config(format!("Invalid host '{}': {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validate server and pipeline settings
    ///
    /// # Errors
    /// - Unparseable host
    /// - Zero body limit
    /// - Invalid removal settings
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.max_upload_bytes == 0 {
            return Err(BgRemovalError::config_value_error(
                "max upload size",
                self.max_upload_bytes,
                "1 byte or more",
                Some(DEFAULT_MAX_UPLOAD_BYTES),
            ));
        }

        self.removal.validate()
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn static_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.static_dir = dir.into();
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn auto_download(mut self, enabled: bool) -> Self {
        self.config.auto_download = enabled;
        self
    }

    #[must_use]
    pub fn removal(mut self, removal: RemovalConfig) -> Self {
        self.config.removal = removal;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`ServerConfig::validate`]
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
