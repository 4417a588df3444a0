//! Tensor preprocessing and prediction decoding shared by every model
//!
//! Input images are stretched to the model's square resolution (no
//! letterboxing), scaled by their own maximum pixel value and normalized per
//! channel. Predictions are min-max normalized and resized back to the image.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Convert an image into a normalized NCHW tensor for inference
    ///
    /// # Errors
    /// - Zero-sized input image
    /// - Zero-sized target resolution
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "preprocessing",
                "image has no pixels",
                Some(&format!("{}x{}", image.width(), image.height())),
            ));
        }

        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::invalid_config(
                "Model input resolution must be non-zero",
            ));
        }

        let resized = image::imageops::resize(
            &image.to_rgb8(),
            target_width,
            target_height,
            FilterType::Lanczos3,
        );

        // Scale by the brightest sample so dark images still span [0, 1]
        let max_value = f32::from(resized.as_raw().iter().copied().max().unwrap_or(0)).max(1e-6);

        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        let mut tensor = Array4::<f32>::zeros((1, 3, target_height as usize, target_width as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / max_value;
                let normalized = (value - mean[channel]) / std[channel];
                if let Some(elem) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *elem = normalized;
                }
            }
        }

        Ok(tensor)
    }

    /// Decode a model prediction into an 8-bit mask of `width` x `height`
    ///
    /// Uses batch 0, channel 0. Values are min-max normalized; a constant
    /// prediction yields an all-zero mask.
    ///
    /// # Errors
    /// - Empty prediction tensor
    pub fn prediction_to_mask(output: &Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
        let (batch, channels, pred_height, pred_width) = output.dim();
        if batch == 0 || channels == 0 || pred_height == 0 || pred_width == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "mask decoding",
                "prediction tensor is empty",
                Some(&format!("{:?}", output.dim())),
            ));
        }

        let plane = output.slice(ndarray::s![0, 0, .., ..]);
        let (min, max) = plane
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let raw_mask = GrayImage::from_fn(pred_width as u32, pred_height as u32, |x, y| {
            let value = plane
                .get([y as usize, x as usize])
                .copied()
                .unwrap_or(min);
            let normalized = if range > f32::EPSILON && value.is_finite() {
                ((value - min) / range).clamp(0.0, 1.0)
            } else {
                0.0
            };
            // Truncating conversion matches uint8 casting of the prediction
            image::Luma([(normalized * 255.0) as u8])
        });

        if raw_mask.dimensions() == (width, height) {
            return Ok(raw_mask);
        }
        Ok(image::imageops::resize(
            &raw_mask,
            width,
            height,
            FilterType::Lanczos3,
        ))
    }
}
