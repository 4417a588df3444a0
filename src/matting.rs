//! Alpha matting for segmentation masks
//!
//! A binary-ish mask from the segmentation model is turned into a trimap
//! (confident foreground, confident background, unknown band). Alpha in the
//! unknown band comes from a guided filter of the mask steered by the image
//! luminance, and foreground colors are recovered with two blur-fusion passes
//! so background color does not bleed into soft edges.

use crate::error::{BgRemovalError, Result};
use crate::mode::MattingParams;
use image::{imageops, GrayImage, Luma, Rgba, RgbImage, RgbaImage};
use ndarray::{Array2, Array3, ArrayView1, ArrayViewMut1, Axis, Zip};

/// Trimap value of confident foreground
pub const TRIMAP_FOREGROUND: u8 = 255;
/// Trimap value of confident background
pub const TRIMAP_BACKGROUND: u8 = 0;
/// Trimap value of the unknown band
pub const TRIMAP_UNKNOWN: u8 = 128;

const MASK_BLUR_SIGMA: f32 = 2.0;
const MASK_THRESHOLD: u8 = 127;

const GUIDED_FILTER_EPS: f32 = 1e-3;

const FOREGROUND_BLUR_SIZE: usize = 90;
const FOREGROUND_REFINE_SIZE: usize = 6;
const BLUR_FUSION_EPS: f32 = 1e-5;

/// Clean up a raw model mask
///
/// Opening with a 3x3 cross removes speckles, a Gaussian blur (sigma 2)
/// smooths the outline and the result is thresholded to `{0, 255}`.
#[must_use]
pub fn post_process_mask(mask: &GrayImage) -> GrayImage {
    let opened = dilate_cross(&erode_cross(mask));
    let mut smoothed = imageops::blur(&opened, MASK_BLUR_SIGMA);
    for pixel in smoothed.pixels_mut() {
        pixel[0] = if pixel[0] < MASK_THRESHOLD { 0 } else { 255 };
    }
    smoothed
}

fn erode_cross(mask: &GrayImage) -> GrayImage {
    cross_filter(mask, u8::min)
}

fn dilate_cross(mask: &GrayImage) -> GrayImage {
    cross_filter(mask, u8::max)
}

/// Apply `reduce` over each pixel and its in-bounds 4-neighbours
fn cross_filter(mask: &GrayImage, reduce: fn(u8, u8) -> u8) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut value = mask.get_pixel(x, y)[0];
        let neighbours = [
            (x.checked_sub(1), Some(y)),
            (x.checked_add(1).filter(|nx| *nx < width), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), y.checked_add(1).filter(|ny| *ny < height)),
        ];
        for (nx, ny) in neighbours {
            if let (Some(nx), Some(ny)) = (nx, ny) {
                value = reduce(value, mask.get_pixel(nx, ny)[0]);
            }
        }
        Luma([value])
    })
}

/// Build a trimap from a mask and matting thresholds
///
/// Pixels above the foreground threshold and below the background threshold
/// are seeds; both seed sets are eroded by a square of `erode_size` pixels.
/// Outside the image counts as not-foreground and as background. Where the
/// two sets overlap, background wins.
#[must_use]
pub fn generate_trimap(mask: &GrayImage, params: &MattingParams) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let size = params.erode_size as usize;

    let foreground: Vec<bool> = mask
        .pixels()
        .map(|p| u16::from(p[0]) > params.foreground_threshold)
        .collect();
    let background: Vec<bool> = mask
        .pixels()
        .map(|p| u16::from(p[0]) < params.background_threshold)
        .collect();

    let foreground = erode_binary(&foreground, w, h, size, false);
    let background = erode_binary(&background, w, h, size, true);

    let values = foreground
        .iter()
        .zip(&background)
        .map(|(&fg, &bg)| {
            if bg {
                TRIMAP_BACKGROUND
            } else if fg {
                TRIMAP_FOREGROUND
            } else {
                TRIMAP_UNKNOWN
            }
        })
        .collect();

    GrayImage::from_raw(width, height, values).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Binary erosion with a `size` x `size` square, done as two 1-D passes
fn erode_binary(values: &[bool], width: usize, height: usize, size: usize, border: bool) -> Vec<bool> {
    if size <= 1 || width == 0 || height == 0 {
        return values.to_vec();
    }
    let before = size / 2;
    let after = size - 1 - before;

    let mut horizontal = Vec::with_capacity(values.len());
    for row in values.chunks(width) {
        horizontal.extend(erode_line(row.iter().copied(), before, after, border));
    }

    let mut result = vec![false; values.len()];
    for x in 0..width {
        let column = horizontal.iter().skip(x).step_by(width).copied();
        let eroded = erode_line(column, before, after, border);
        for (slot, value) in result.iter_mut().skip(x).step_by(width).zip(eroded) {
            *slot = value;
        }
    }
    result
}

fn erode_line(line: impl Iterator<Item = bool>, before: usize, after: usize, border: bool) -> Vec<bool> {
    // Running count of unset values, so each window is an O(1) lookup
    let mut unset_prefix = vec![0usize];
    let mut unset = 0;
    for value in line {
        if !value {
            unset += 1;
        }
        unset_prefix.push(unset);
    }
    let len = unset_prefix.len() - 1;

    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(len);
            let clipped = i < before || i + after + 1 > len;
            let unset_in_window = unset_prefix.get(hi).copied().unwrap_or(unset)
                - unset_prefix.get(lo).copied().unwrap_or(0);
            unset_in_window == 0 && (border || !clipped)
        })
        .collect()
}

/// Mean over the window `[i - before, i + after]` in both axes
///
/// Windows are clipped at the image border and averaged over the pixels
/// they actually cover.
pub(crate) fn box_mean(src: &Array2<f32>, before: usize, after: usize) -> Array2<f32> {
    let mut horizontal = Array2::<f32>::zeros(src.raw_dim());
    for (input, output) in src.rows().into_iter().zip(horizontal.rows_mut()) {
        mean_line(input, output, before, after);
    }

    let mut result = Array2::<f32>::zeros(src.raw_dim());
    for (input, output) in horizontal.columns().into_iter().zip(result.columns_mut()) {
        mean_line(input, output, before, after);
    }
    result
}

fn mean_line(input: ArrayView1<'_, f32>, mut output: ArrayViewMut1<'_, f32>, before: usize, after: usize) {
    let len = input.len();
    let mut prefix = Vec::with_capacity(len + 1);
    let mut acc = 0.0f64;
    prefix.push(acc);
    for &value in &input {
        acc += f64::from(value);
        prefix.push(acc);
    }

    for (i, out) in output.iter_mut().enumerate() {
        let lo = i.saturating_sub(before);
        let hi = (i + after + 1).min(len);
        let sum = prefix.get(hi).copied().unwrap_or(acc) - prefix.get(lo).copied().unwrap_or(0.0);
        *out = (sum / (hi - lo).max(1) as f64) as f32;
    }
}

/// Edge-aware smoothing of `input` steered by `guide`
fn guided_filter(guide: &Array2<f32>, input: &Array2<f32>, radius: usize, eps: f32) -> Array2<f32> {
    let mean = |a: &Array2<f32>| box_mean(a, radius, radius);

    let mean_guide = mean(guide);
    let mean_input = mean(input);
    let corr_guide_input = mean(&(guide * input));
    let corr_guide = mean(&(guide * guide));

    let var_guide = &corr_guide - &(&mean_guide * &mean_guide);
    let cov_guide_input = &corr_guide_input - &(&mean_guide * &mean_input);

    let a = &cov_guide_input / &(var_guide + eps);
    let b = &mean_input - &(&a * &mean_guide);

    mean(&a) * guide + mean(&b)
}

fn gray_to_array(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        f32::from(image.get_pixel(x as u32, y as u32)[0]) / 255.0
    })
}

fn rgb_to_array(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0
    })
}

/// Estimate per-pixel alpha in `[0, 1]` from a trimap
///
/// Known regions are exact; the unknown band takes the guided filter of the
/// mask with the image luminance as guide.
#[must_use]
pub fn estimate_alpha(image: &RgbImage, mask: &GrayImage, trimap: &GrayImage, radius: usize) -> Array2<f32> {
    let guide = gray_to_array(&imageops::grayscale(image));
    let filtered = guided_filter(&guide, &gray_to_array(mask), radius.max(1), GUIDED_FILTER_EPS);

    let mut alpha = filtered;
    for ((y, x), value) in alpha.indexed_iter_mut() {
        *value = match trimap.get_pixel(x as u32, y as u32)[0] {
            TRIMAP_FOREGROUND => 1.0,
            TRIMAP_BACKGROUND => 0.0,
            _ => (*value).clamp(0.0, 1.0),
        };
    }
    alpha
}

/// One blur-fusion step over a box window of `size` pixels
///
/// Returns the refined foreground and the blurred background estimate.
fn blur_fusion(
    image: &Array3<f32>,
    foreground: &Array3<f32>,
    background: &Array3<f32>,
    alpha: &Array2<f32>,
    size: usize,
) -> (Array3<f32>, Array3<f32>) {
    let size = size.max(1);
    let before = size / 2;
    let after = size - 1 - before;

    let blurred_alpha = box_mean(alpha, before, after);
    let fg_denominator = blurred_alpha.mapv(|a| a + BLUR_FUSION_EPS);
    let bg_denominator = blurred_alpha.mapv(|a| 1.0 - a + BLUR_FUSION_EPS);
    let inverse_alpha = alpha.mapv(|a| 1.0 - a);

    let mut refined_fg = Array3::<f32>::zeros(image.raw_dim());
    let mut blurred_bg_out = Array3::<f32>::zeros(image.raw_dim());

    for channel in 0..image.len_of(Axis(2)) {
        let image_c = image.index_axis(Axis(2), channel);
        let fg_c = foreground.index_axis(Axis(2), channel);
        let bg_c = background.index_axis(Axis(2), channel);

        let blurred_fg = box_mean(&(&fg_c * alpha), before, after) / &fg_denominator;
        let blurred_bg = box_mean(&(&bg_c * &inverse_alpha), before, after) / &bg_denominator;

        let mut out = refined_fg.index_axis_mut(Axis(2), channel);
        Zip::from(&mut out)
            .and(&image_c)
            .and(alpha)
            .and(&blurred_fg)
            .and(&blurred_bg)
            .for_each(|out, &i, &a, &f, &b| {
                *out = (f + a * (i - a * f - (1.0 - a) * b)).clamp(0.0, 1.0);
            });

        blurred_bg_out
            .index_axis_mut(Axis(2), channel)
            .assign(&blurred_bg);
    }

    (refined_fg, blurred_bg_out)
}

/// Recover foreground colors under a soft alpha, values in `[0, 1]`
#[must_use]
pub fn estimate_foreground(image: &RgbImage, alpha: &Array2<f32>) -> Array3<f32> {
    let image = rgb_to_array(image);
    let (foreground, background) = blur_fusion(&image, &image, &image, alpha, FOREGROUND_BLUR_SIZE);
    let (foreground, _) = blur_fusion(&image, &foreground, &background, alpha, FOREGROUND_REFINE_SIZE);
    foreground
}

/// Cut out the foreground with alpha matting
///
/// # Errors
/// - Mask and image dimensions differ
pub fn alpha_matting_cutout(image: &RgbImage, mask: &GrayImage, params: &MattingParams) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(BgRemovalError::processing_stage_error(
            "alpha matting",
            "mask and image sizes differ",
            Some(&format!("image {:?}, mask {:?}", image.dimensions(), mask.dimensions())),
        ));
    }

    let trimap = generate_trimap(mask, params);
    let alpha = estimate_alpha(image, mask, &trimap, params.erode_size as usize);
    let foreground = estimate_foreground(image, &alpha);

    let (width, height) = image.dimensions();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let (row, col) = (y as usize, x as usize);
        let channel = |c: usize| to_u8(foreground.get([row, col, c]).copied().unwrap_or(0.0));
        Rgba([
            channel(0),
            channel(1),
            channel(2),
            to_u8(alpha.get([row, col]).copied().unwrap_or(0.0)),
        ])
    }))
}

/// Composite the image over transparent black using the mask as weight
///
/// # Errors
/// - Mask and image dimensions differ
pub fn naive_cutout(image: &RgbaImage, mask: &GrayImage) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(BgRemovalError::processing_stage_error(
            "cutout",
            "mask and image sizes differ",
            Some(&format!("image {:?}, mask {:?}", image.dimensions(), mask.dimensions())),
        ));
    }

    let mut cutout = image.clone();
    for (pixel, weight) in cutout.pixels_mut().zip(mask.pixels()) {
        let weight = u32::from(weight[0]);
        for channel in pixel.0.iter_mut() {
            *channel = ((u32::from(*channel) * weight + 127) / 255) as u8;
        }
    }
    Ok(cutout)
}

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
