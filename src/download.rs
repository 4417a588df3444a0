//! Model downloading
//!
//! Async download of ONNX model files over HTTPS with streaming writes,
//! SHA-256 digests and atomic placement (`<file>.part` renamed on success).
//! Concurrent requests for the same model share one download.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use crate::models::SegmentationModel;
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::io::StreamReader;
use tracing::instrument;

/// Summary of a completed download
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the file contents
    pub sha256: String,
}

/// Model downloader backed by a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
    base_url: Option<String>,
    locks: Mutex<HashMap<SegmentationModel, Arc<Mutex<()>>>>,
}

impl ModelDownloader {
    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            cache,
            base_url: None,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch models from `<base_url>/<model file>` instead of the public release
    #[must_use]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// URL the model is fetched from
    #[must_use]
    pub fn model_url(&self, model: SegmentationModel) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base, model.file_name()),
            None => model.url(),
        }
    }

    /// Get the model cache for other operations
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Return the local path of `model`, downloading it first if missing
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing the model
    #[instrument(skip(self), fields(model = %model))]
    pub async fn ensure_model(&self, model: SegmentationModel) -> Result<PathBuf> {
        let path = self.cache.get_model_path(model);
        if self.cache.is_model_cached(model) {
            return Ok(path);
        }

        let model_lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(model).or_default())
        };
        let _guard = model_lock.lock().await;

        // Another request may have finished the download while we waited
        if self.cache.is_model_cached(model) {
            return Ok(path);
        }

        let url = self.model_url(model);
        tracing::info!(url = %url, "Model {} not cached, downloading", model);
        let downloaded = self.download_file(&url, &path).await?;
        tracing::info!(
            size_bytes = downloaded.size_bytes,
            sha256 = %downloaded.sha256,
            "Downloaded model {}",
            model
        );

        Ok(downloaded.path)
    }

    /// Ensure every model in `models` is present
    ///
    /// # Errors
    /// - First failure from [`ModelDownloader::ensure_model`]
    pub async fn ensure_models(&self, models: &[SegmentationModel]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(models.len());
        for model in models {
            paths.push(self.ensure_model(*model).await?);
        }
        Ok(paths)
    }

    /// Stream `url` into `local_path` via a `.part` file
    async fn download_file(&self, url: &str, local_path: &Path) -> Result<DownloadedFile> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("HTTP error for {}", url),
                response.status(),
            ));
        }

        let total_size = response.content_length();
        let part_path = local_path.with_extension("onnx.part");

        let result = Self::stream_to_file(response, &part_path, total_size).await;
        let (size_bytes, sha256) = match result {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(cleanup_err) = tokio::fs::remove_file(&part_path).await {
                    log::warn!(
                        "Failed to remove partial download {}: {}",
                        part_path.display(),
                        cleanup_err
                    );
                }
                return Err(e);
            },
        };

        if size_bytes == 0 {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(BgRemovalError::network_error(
                format!("Empty response body for {}", url),
                "0 bytes received",
            ));
        }

        tokio::fs::rename(&part_path, local_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("move downloaded model", local_path, &e))?;

        log::debug!("Downloaded {} bytes to {}", size_bytes, local_path.display());
        Ok(DownloadedFile {
            path: local_path.to_path_buf(),
            size_bytes,
            sha256,
        })
    }

    async fn stream_to_file(
        response: reqwest::Response,
        part_path: &Path,
        total_size: Option<u64>,
    ) -> Result<(u64, String)> {
        let mut file = tokio::fs::File::create(part_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create file", part_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        let mut last_logged_percent = 0u64;

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", part_path, &e))?;

            downloaded += bytes_read as u64;

            if let Some(total) = total_size.filter(|total| *total > 0) {
                let percent = downloaded * 100 / total;
                if percent >= last_logged_percent + 25 {
                    last_logged_percent = percent - percent % 25;
                    log::info!("Download progress: {}% of {} bytes", percent, total);
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", part_path, &e))?;

        Ok((downloaded, format!("{:x}", hasher.finalize())))
    }
}
