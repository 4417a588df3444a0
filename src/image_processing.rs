//! Pixel-level stages around segmentation: input enhancement, resizing,
//! alpha refinement and multi-model blending

use crate::error::{BgRemovalError, Result};
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma, Rgba, Rgba32FImage, RgbaImage};

/// 3x3 smoothing kernel used as the "blurred" reference when sharpening
const SMOOTH_KERNEL: [u32; 9] = [1, 1, 1, 1, 5, 1, 1, 1, 1];
const SMOOTH_KERNEL_SUM: u32 = 13;

/// Normalize the color mode to RGB, or RGBA when the source has alpha
#[must_use]
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Largest pixel count an upscaled working image may have
pub const MAX_UPSCALED_PIXELS: u64 = 40_000_000;

/// Dimensions after scaling the short side up to `min_side`
///
/// Returns `Ok(None)` when the image is already large enough. The long side
/// is scaled with integer division.
///
/// # Errors
/// - The upscaled image would exceed [`MAX_UPSCALED_PIXELS`] or `u32` sides
pub fn upscale_dimensions(width: u32, height: u32, min_side: u32) -> Result<Option<(u32, u32)>> {
    let short = width.min(height);
    if short == 0 || short >= min_side {
        return Ok(None);
    }
    let long = u64::from(width.max(height)) * u64::from(min_side) / u64::from(short);
    let too_large = || {
        BgRemovalError::processing_stage_error(
            "enhancement",
            &format!("upscaled image would exceed {} pixels", MAX_UPSCALED_PIXELS),
            Some(&format!("{}x{} to short side {}", width, height, min_side)),
        )
    };
    if long.saturating_mul(u64::from(min_side)) > MAX_UPSCALED_PIXELS {
        return Err(too_large());
    }
    let long = u32::try_from(long).map_err(|_| too_large())?;
    Ok(Some(if width <= height {
        (min_side, long)
    } else {
        (long, min_side)
    }))
}

/// Upscale so the short side equals `min_side` (Lanczos3), if smaller
///
/// # Errors
/// - Same as [`upscale_dimensions`]
pub fn upscale_to_min_side(image: &DynamicImage, min_side: u32) -> Result<Option<DynamicImage>> {
    let Some((width, height)) = upscale_dimensions(image.width(), image.height(), min_side)? else {
        return Ok(None);
    };
    log::debug!(
        "Upscaling {}x{} -> {}x{}",
        image.width(),
        image.height(),
        width,
        height
    );
    Ok(Some(image.resize_exact(width, height, FilterType::Lanczos3)))
}

/// Sharpen by extrapolating away from a 3x3 smoothed copy
///
/// `out = smooth + factor * (image - smooth)`, clamped. Border pixels of the
/// smoothed copy equal the source, so the outermost ring is unchanged. A
/// factor of 1.0 returns the image as is.
#[must_use]
pub fn sharpen(image: &DynamicImage, factor: f32) -> DynamicImage {
    match image {
        DynamicImage::ImageRgba8(buffer) => {
            let mut out = buffer.clone();
            sharpen_raw(buffer.as_raw(), &mut out, buffer.width(), buffer.height(), 4, factor);
            DynamicImage::ImageRgba8(out)
        },
        other => {
            let buffer = other.to_rgb8();
            let mut out = buffer.clone();
            sharpen_raw(buffer.as_raw(), &mut out, buffer.width(), buffer.height(), 3, factor);
            DynamicImage::ImageRgb8(out)
        },
    }
}

fn sharpen_raw(src: &[u8], dst: &mut [u8], width: u32, height: u32, channels: usize, factor: f32) {
    let (width, height) = (width as usize, height as usize);
    if width < 3 || height < 3 || (factor - 1.0).abs() < f32::EPSILON {
        return;
    }
    let stride = width * channels;
    let sample = |x: usize, y: usize, c: usize| u32::from(src.get(y * stride + x * channels + c).copied().unwrap_or(0));

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            for c in 0..channels {
                let mut sum = 0;
                for (k, weight) in SMOOTH_KERNEL.iter().enumerate() {
                    sum += weight * sample(x + k % 3 - 1, y + k / 3 - 1, c);
                }
                let smooth = (sum as f32 / SMOOTH_KERNEL_SUM as f32).round();
                let original = sample(x, y, c) as f32;
                let value = smooth + factor * (original - smooth);
                if let Some(slot) = dst.get_mut(y * stride + x * channels + c) {
                    *slot = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Resize an RGBA image with Lanczos3 on premultiplied alpha
///
/// Filtering premultiplied values keeps transparent pixels' colors from
/// bleeding into the edge.
#[must_use]
pub fn resize_rgba_premultiplied(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }

    let premultiplied = Rgba32FImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0.map(|v| f32::from(v) / 255.0);
        Rgba([r * a, g * a, b * a, a])
    });
    let resized = imageops::resize(&premultiplied, width, height, FilterType::Lanczos3);

    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = resized.get_pixel(x, y).0;
        let alpha = a.clamp(0.0, 1.0);
        if alpha <= f32::EPSILON {
            return Rgba([0, 0, 0, 0]);
        }
        let channel = |v: f32| ((v / alpha).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([channel(r), channel(g), channel(b), (alpha * 255.0).round() as u8])
    })
}

/// Gaussian blur of the alpha channel only; `sigma <= 0` is a no-op
pub fn blur_alpha(image: &mut RgbaImage, sigma: f32) {
    if sigma <= 0.0 {
        return;
    }
    let alpha = GrayImage::from_fn(image.width(), image.height(), |x, y| Luma([image.get_pixel(x, y)[3]]));
    let blurred = imageops::blur(&alpha, sigma);
    for (pixel, value) in image.pixels_mut().zip(blurred.pixels()) {
        pixel[3] = value[0];
    }
}

/// Combine two cutouts: color from `primary`, per-pixel maximum alpha
///
/// # Errors
/// - Cutouts have different dimensions
pub fn blend_max_alpha(primary: &RgbaImage, secondary: &RgbaImage) -> Result<RgbaImage> {
    if primary.dimensions() != secondary.dimensions() {
        return Err(BgRemovalError::processing_stage_error(
            "blend",
            "cutouts have different sizes",
            Some(&format!("{:?} vs {:?}", primary.dimensions(), secondary.dimensions())),
        ));
    }

    let mut blended = primary.clone();
    for (pixel, other) in blended.pixels_mut().zip(secondary.pixels()) {
        pixel[3] = pixel[3].max(other[3]);
    }
    Ok(blended)
}
