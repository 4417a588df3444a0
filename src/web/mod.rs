//! HTTP front-end
//!
//! Routes:
//!
//! | Method | Path                 | Handler                         |
//! |--------|----------------------|---------------------------------|
//! | GET    | `/`                  | upload form                     |
//! | POST   | `/remove`            | upload + background removal     |
//! | GET    | `/manual_editor`     | empty manual editor             |
//! | POST   | `/upload_for_manual` | upload + editor preloaded       |
//! | POST   | `/save_manual_edit`  | store an edited PNG (JSON)      |
//! | GET    | `/result_manual`     | view a saved manual edit        |
//! | GET    | `/uploads/{*path}`   | files under `<static>/uploads`  |
//! | GET    | `/static/{*path}`    | files under `<static>`          |
//! | GET    | `/health`            | liveness and backend info       |

pub mod error;
pub mod handlers;
pub mod storage;
pub mod upload;
pub mod views;

pub use error::{JsonError, WebError};
pub use storage::StorageLayout;

use crate::{
    config::ServerConfig,
    download::ModelDownloader,
    error::{BgRemovalError, Result},
    mode::ProcessingMode,
    processor::BackgroundRemovalProcessor,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info as trace_info;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub storage: Arc<StorageLayout>,
    pub processor: Arc<BackgroundRemovalProcessor>,
    /// Present when missing models are fetched on demand
    pub downloader: Option<Arc<ModelDownloader>>,
}

impl AppState {
    /// Assemble the state and create the static tree
    ///
    /// # Errors
    /// - Invalid server configuration
    /// - Static folders cannot be created
    pub fn new(
        config: ServerConfig,
        processor: Arc<BackgroundRemovalProcessor>,
        downloader: Option<Arc<ModelDownloader>>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = StorageLayout::new(config.static_dir.clone());
        storage.ensure()?;

        Ok(Self {
            config: Arc::new(config),
            storage: Arc::new(storage),
            processor,
            downloader,
        })
    }

    /// Default processor, plus a downloader when `auto_download` is set
    ///
    /// # Errors
    /// - Same as [`AppState::new`]
    /// - Processor or downloader construction failures
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let processor = Arc::new(BackgroundRemovalProcessor::new(config.removal.clone())?);
        let downloader = if config.auto_download {
            Some(Arc::new(ModelDownloader::new(processor.model_cache().clone())?))
        } else {
            None
        };
        Self::new(config, processor, downloader)
    }

    /// Download the models `mode` needs when the backend reads model files
    ///
    /// # Errors
    /// - Download or verification failures
    pub async fn ensure_models(&self, mode: ProcessingMode) -> Result<()> {
        if !self.processor.requires_model_files() {
            return Ok(());
        }
        if let Some(downloader) = &self.downloader {
            downloader.ensure_models(&mode.models()).await?;
        }
        Ok(())
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::index))
        .route("/remove", post(handlers::remove))
        .route("/manual_editor", get(handlers::manual_editor))
        .route("/upload_for_manual", post(handlers::upload_for_manual))
        .route("/save_manual_edit", post(handlers::save_manual_edit))
        .route("/result_manual", get(handlers::result_manual))
        .route("/uploads/{*path}", get(handlers::uploaded_file))
        .route("/static/{*path}", get(handlers::static_file))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct WebServer {
    router: Router,
    listener: TcpListener,
}

impl WebServer {
    /// Bind the configured address
    ///
    /// # Errors
    /// - Invalid host
    /// - Address already in use or not permitted
    pub async fn bind(config: &ServerConfig, state: AppState) -> Result<Self> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to bind {addr}"), e))?;

        Ok(Self {
            router: router(state),
            listener,
        })
    }

    /// Address actually bound (resolves port 0)
    ///
    /// # Errors
    /// - Socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until Ctrl+C or SIGTERM
    ///
    /// # Errors
    /// - Server I/O failures
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` completes, then drain in-flight requests
    ///
    /// # Errors
    /// - Server I/O failures
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            trace_info!(address = %addr, "Serving background removal front-end");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        trace_info!("Server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    trace_info!("Shutdown signal received, draining connections");
}
