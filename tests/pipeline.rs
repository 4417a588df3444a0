//! Pipeline tests across input formats and modes, using the mock backend

mod common;

use bgremove_web::{
    image_processing::blend_max_alpha, remove_background, BgRemovalError, ImageIOService, MockBackendFactory,
    ProcessingMode, RemovalConfig,
};
use common::{encode, mock_processor, test_image, TEST_SVG};
use image::{GenericImageView, ImageFormat, RgbaImage};
use std::sync::Arc;
use tempfile::TempDir;

fn write_inputs(dir: &TempDir) -> Vec<std::path::PathBuf> {
    let image = test_image(48, 36);
    let mut paths = Vec::new();
    for (name, format) in [
        ("photo.png", ImageFormat::Png),
        ("photo.jpg", ImageFormat::Jpeg),
        ("photo.webp", ImageFormat::WebP),
    ] {
        let path = dir.path().join(name);
        std::fs::write(&path, encode(&image, format)).unwrap();
        paths.push(path);
    }

    let icon = image.resize_exact(32, 32, image::imageops::FilterType::Triangle);
    let ico_path = dir.path().join("favicon.ico");
    std::fs::write(&ico_path, encode(&icon, ImageFormat::Ico)).unwrap();
    paths.push(ico_path);

    let svg_path = dir.path().join("logo.svg");
    std::fs::write(&svg_path, TEST_SVG).unwrap();
    paths.push(svg_path);
    paths
}

#[test]
fn test_every_format_and_mode_gives_rgba_png_of_input_size() {
    let inputs_dir = TempDir::new().unwrap();
    let outputs_dir = TempDir::new().unwrap();
    let models_dir = TempDir::new().unwrap();
    let processor = mock_processor(Arc::new(MockBackendFactory::new()), models_dir.path());

    for input in write_inputs(&inputs_dir) {
        let expected = ImageIOService::load_image(&input).unwrap().dimensions();
        for mode in ProcessingMode::ALL {
            let output = outputs_dir
                .path()
                .join(format!("{}_{}.jpg", input.file_stem().unwrap().to_string_lossy(), mode));
            let written = processor.process_file(&input, &output, mode).unwrap();

            assert_eq!(written.extension().unwrap(), "png");
            let bytes = std::fs::read(&written).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);

            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.color(), image::ColorType::Rgba8, "{}", input.display());
            assert_eq!(decoded.dimensions(), expected, "{} {}", input.display(), mode);
        }
    }
}

#[test]
fn test_svg_is_rasterized_at_intrinsic_size() {
    let image = ImageIOService::load_from_bytes(TEST_SVG.as_bytes()).unwrap();
    assert_eq!(image.dimensions(), (40, 30));
}

#[test]
fn test_same_input_twice_is_identical() {
    let models_dir = TempDir::new().unwrap();
    let processor = mock_processor(Arc::new(MockBackendFactory::new()), models_dir.path());
    let image = test_image(40, 40);

    for mode in ProcessingMode::ALL {
        let first = processor.process_image(&image, mode).unwrap();
        let second = processor.process_image(&image, mode).unwrap();
        assert_eq!(first.dimensions(), second.dimensions());
        assert_eq!(first.image, second.image, "{mode}");
    }
}

#[test]
fn test_advanced_blend_is_pixelwise_max_alpha() {
    let first = RgbaImage::from_fn(5, 4, |x, y| image::Rgba([10, 20, 30, ((x * 50 + y * 7) % 256) as u8]));
    let second = RgbaImage::from_fn(5, 4, |x, y| image::Rgba([200, 200, 200, ((y * 60 + x * 3) % 256) as u8]));

    let blended = blend_max_alpha(&first, &second).unwrap();
    for ((out, a), b) in blended.pixels().zip(first.pixels()).zip(second.pixels()) {
        assert_eq!(out[3], a[3].max(b[3]));
        assert_eq!(&out.0[..3], &a.0[..3]);
    }
}

#[test]
fn test_advanced_runs_two_models_per_image() {
    let models_dir = TempDir::new().unwrap();
    let factory = Arc::new(MockBackendFactory::new());
    let processor = mock_processor(Arc::clone(&factory), models_dir.path());

    let result = processor.process_image(&test_image(24, 24), ProcessingMode::Advanced).unwrap();
    assert_eq!(result.models.len(), 2);
    assert_eq!(factory.inference_calls(), 2);
    assert_eq!(result.timings.image_encode_ms, None);
}

#[test]
fn test_library_entry_point_reports_missing_models() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("photo.png");
    std::fs::write(&input, encode(&test_image(16, 16), ImageFormat::Png)).unwrap();

    let config = RemovalConfig::builder()
        .model_dir(dir.path().join("empty-models"))
        .build()
        .unwrap();
    let err = remove_background(&input, dir.path().join("out.png"), ProcessingMode::Fast, &config).unwrap_err();
    assert!(matches!(err, BgRemovalError::Model(_)), "{err}");
    assert!(!dir.path().join("out.png").exists());
}

#[test]
fn test_missing_input_file() {
    let dir = TempDir::new().unwrap();
    let models_dir = TempDir::new().unwrap();
    let processor = mock_processor(Arc::new(MockBackendFactory::new()), models_dir.path());

    let result = processor.process_file(dir.path().join("absent.png"), dir.path().join("out.png"), ProcessingMode::Best);
    assert!(result.is_err());
    assert!(!dir.path().join("out.png").exists());
}
