//! Shared helpers for integration tests
#![allow(dead_code)]

use bgremove_web::{
    web::{AppState, WebServer},
    BackgroundRemovalProcessor, MockBackendFactory, ModelCache, RemovalConfig, ServerConfig,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Removal settings that keep mock runs small
pub fn test_removal_config() -> RemovalConfig {
    RemovalConfig::builder().upscale_min_side(64).build().unwrap()
}

pub fn mock_processor(factory: Arc<MockBackendFactory>, model_dir: &Path) -> BackgroundRemovalProcessor {
    let cache = ModelCache::with_custom_cache_dir(model_dir).unwrap();
    BackgroundRemovalProcessor::with_factory(test_removal_config(), factory, cache).unwrap()
}

/// Gradient test image
pub fn test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 9 % 256) as u8, (y * 4 % 256) as u8, 90])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub const TEST_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="30">
  <rect width="40" height="30" fill="#3060c0"/>
  <circle cx="20" cy="15" r="9" fill="#f0d020"/>
</svg>"##;

/// Server on an ephemeral port with a mock backend
pub struct TestServer {
    pub addr: SocketAddr,
    pub static_dir: TempDir,
    pub model_dir: TempDir,
    pub factory: Arc<MockBackendFactory>,
}

impl TestServer {
    pub async fn start(factory: MockBackendFactory, max_upload_bytes: usize) -> Self {
        let static_dir = TempDir::new().unwrap();
        let model_dir = TempDir::new().unwrap();
        let factory = Arc::new(factory);

        let config = ServerConfig::builder()
            .port(0)
            .static_dir(static_dir.path())
            .max_upload_bytes(max_upload_bytes)
            .auto_download(false)
            .removal(test_removal_config())
            .build()
            .unwrap();

        let processor = Arc::new(mock_processor(Arc::clone(&factory), model_dir.path()));
        let state = AppState::new(config.clone(), processor, None).unwrap();
        let server = WebServer::bind(&config, state).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run_until(std::future::pending()));

        Self {
            addr,
            static_dir,
            model_dir,
            factory,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn uploads(&self) -> PathBuf {
        self.static_dir.path().join("uploads")
    }
}
