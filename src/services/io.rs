//! Image I/O operations service
//!
//! Decoding of every accepted upload format (raster formats through `image`,
//! SVG rasterized with `resvg`) and in-memory PNG encoding of results.

use crate::error::{BgRemovalError, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use resvg::usvg;
use std::path::{Path, PathBuf};

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// SVG files (by extension) are rasterized at their intrinsic size. Other
    /// files are decoded by extension first, then by content.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgremove_web::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Undecodable image data or invalid SVG
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        let is_svg = path_ref
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
        if is_svg {
            let data = std::fs::read(path_ref)
                .map_err(|e| BgRemovalError::file_io_error("read SVG file", path_ref, &e))?;
            return Self::rasterize_svg(&data);
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;

                Self::load_from_bytes(&data).map_err(|content_err| {
                    let extension = path_ref
                        .extension()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown");

                    BgRemovalError::processing_stage_error(
                        "image loading",
                        &format!(
                            "cannot decode as {} ({}) or by content ({})",
                            extension, e, content_err
                        ),
                        Some(&format!("path: {}, size: {} bytes", path_ref.display(), data.len())),
                    )
                })
            },
        }
    }

    /// Decode an image from bytes, recognizing SVG documents by content
    ///
    /// # Errors
    /// - Undecodable image data or invalid SVG
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if Self::looks_like_svg(bytes) {
            return Self::rasterize_svg(bytes);
        }
        image::load_from_memory(bytes).map_err(|e| {
            BgRemovalError::processing(format!("Failed to decode image from bytes: {}", e))
        })
    }

    fn looks_like_svg(bytes: &[u8]) -> bool {
        let head = bytes.get(..bytes.len().min(512)).unwrap_or(bytes);
        let head = String::from_utf8_lossy(head);
        let head = head.trim_start_matches('\u{feff}').trim_start();
        head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
    }

    /// Rasterize an SVG document at its intrinsic size into straight RGBA
    ///
    /// # Errors
    /// - SVG parse failures
    /// - Empty document dimensions
    pub fn rasterize_svg(data: &[u8]) -> Result<DynamicImage> {
        let tree = usvg::Tree::from_data(data, &usvg::Options::default())
            .map_err(|e| BgRemovalError::svg(e.to_string()))?;

        let pixmap_size = tree.size().to_int_size();
        let (width, height) = (pixmap_size.width(), pixmap_size.height());
        if width == 0 || height == 0 {
            return Err(BgRemovalError::svg("SVG has empty dimensions"));
        }

        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| BgRemovalError::svg("Failed to allocate SVG pixmap"))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        // Pixmap storage is premultiplied
        let mut raw = Vec::with_capacity(pixmap.pixels().len() * 4);
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            raw.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }

        RgbaImage::from_raw(width, height, raw)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| BgRemovalError::svg("SVG raster has unexpected size"))
    }

    /// Encode RGBA pixels as PNG with fast compression
    ///
    /// # Errors
    /// - PNG encoder failures
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut buffer, CompressionType::Fast, FilterType::Adaptive);
        encoder.write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )?;
        Ok(buffer)
    }

    /// Write bytes to `path`, creating parent directories
    ///
    /// # Errors
    /// - File system errors
    pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgRemovalError::file_io_error("create output directory", parent, &e)
            })?;
        }
        std::fs::write(path, bytes).map_err(|e| BgRemovalError::file_io_error("write file", path, &e))
    }

    /// Encode as PNG in memory, then write; nothing is written on failure
    ///
    /// # Errors
    /// - Same as [`ImageIOService::encode_png`] and [`ImageIOService::write_bytes`]
    pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
        let bytes = Self::encode_png(image)?;
        Self::write_bytes(path, &bytes)
    }

    /// Replace or add the extension so the path ends in `.png`
    #[must_use]
    pub fn force_png_extension(path: &Path) -> PathBuf {
        path.with_extension("png")
    }
}
