//! Result types for background removal operations

use crate::{error::Result, mode::ProcessingMode, models::SegmentationModel, services::ImageIOService};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Cutout with the background made transparent
    pub image: RgbaImage,

    /// Mode that produced the cutout; `None` for the feathered variant
    pub mode: Option<ProcessingMode>,

    /// Input dimensions, equal to the cutout dimensions
    pub original_dimensions: (u32, u32),

    /// Models run, in pass order
    pub models: Vec<SegmentationModel>,

    pub timings: ProcessingTimings,
}

impl RemovalResult {
    /// Encode the cutout as PNG in memory
    ///
    /// # Errors
    /// - PNG encoding failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageIOService::encode_png(&self.image)
    }

    /// Encode and write the cutout as PNG, recording the encode time
    ///
    /// The file is only created once encoding has succeeded.
    ///
    /// # Errors
    /// - PNG encoding failures
    /// - File system errors while writing
    pub fn save_png<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let encode_start = instant::Instant::now();
        let bytes = self.to_png_bytes()?;
        self.timings.image_encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        ImageIOService::write_bytes(path.as_ref(), &bytes)
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.timings;
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Enhance: {}ms | Segmentation: {}ms | Matting: {}ms | Postprocess: {}ms",
            t.total_ms,
            t.image_decode_ms,
            t.enhancement_ms,
            t.segmentation_ms,
            t.matting_ms,
            t.postprocessing_ms
        );
        if let Some(encode_ms) = t.image_encode_ms {
            summary.push_str(&format!(" | Encode: {}ms", encode_ms));
        }
        summary
    }
}

/// Per-stage wall clock timings in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding the input file (zero for in-memory images)
    pub image_decode_ms: u64,

    /// Upscaling and sharpening
    pub enhancement_ms: u64,

    /// Session lookup, preprocessing and inference across all passes
    pub segmentation_ms: u64,

    /// Mask post-processing, trimap and matting across all passes
    pub matting_ms: u64,

    /// Downscaling, blending and edge refinement
    pub postprocessing_ms: u64,

    /// PNG encoding, once the result has been written
    pub image_encode_ms: Option<u64>,

    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent in segmentation
    #[must_use]
    pub fn segmentation_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.segmentation_ms as f64 / self.total_ms as f64
        }
    }
}
