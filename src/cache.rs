//! Model cache management for downloaded models
//!
//! Model files live flat in one directory, one `<model-id>.onnx` per
//! [`SegmentationModel`]. The directory is resolved from configuration, the
//! `BGREMOVE_MODEL_DIR` environment variable, or the user cache directory.

use crate::error::{BgRemovalError, Result};
use crate::models::SegmentationModel;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the model directory
pub const MODEL_DIR_ENV: &str = "BGREMOVE_MODEL_DIR";

/// Information about a cached model
#[derive(Debug, Clone, Serialize)]
pub struct CachedModelInfo {
    pub model: SegmentationModel,
    /// Path to the model file
    pub path: PathBuf,
    /// Size of the model file in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache in the default location
    ///
    /// - `$BGREMOVE_MODEL_DIR` when set
    /// - otherwise `<user cache dir>/bgremove-web/models`
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Create a cache rooted at `cache_dir`, creating it if needed
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create model directory", cache_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Create a cache from an optional configured directory
    ///
    /// # Errors
    /// - Same as [`ModelCache::new`] and [`ModelCache::with_custom_cache_dir`]
    pub fn from_config_dir(model_dir: Option<&Path>) -> Result<Self> {
        match model_dir {
            Some(dir) => Self::with_custom_cache_dir(dir),
            None => Self::new(),
        }
    }

    fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(dir_override) = std::env::var(MODEL_DIR_ENV) {
            if !dir_override.trim().is_empty() {
                return Ok(PathBuf::from(dir_override));
            }
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    MODEL_DIR_ENV
                ))
            })?
            .join("bgremove-web")
            .join("models"))
    }

    /// Path of the model file (may not exist)
    #[must_use]
    pub fn get_model_path(&self, model: SegmentationModel) -> PathBuf {
        self.cache_dir.join(model.file_name())
    }

    /// Whether a non-empty model file is present
    #[must_use]
    pub fn is_model_cached(&self, model: SegmentationModel) -> bool {
        fs::metadata(self.get_model_path(model))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// List every known model present in the cache, in registry order
    ///
    /// # Errors
    /// - Failed to read metadata of a present model file
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        for model in SegmentationModel::ALL {
            if !self.is_model_cached(model) {
                continue;
            }
            let path = self.get_model_path(model);
            let size_bytes = fs::metadata(&path)
                .map_err(|e| BgRemovalError::file_io_error("read model metadata", &path, &e))?
                .len();
            models.push(CachedModelInfo {
                model,
                path,
                size_bytes,
            });
        }

        Ok(models)
    }

    /// Get the current cache directory path
    #[must_use]
    pub fn get_current_cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
