use bgremove_web::{
    image_processing::{resize_rgba_premultiplied, sharpen, upscale_to_min_side},
    matting::{alpha_matting_cutout, generate_trimap, post_process_mask},
    mode::{ProcessingMode, FEATHER_PASS},
    BackgroundRemovalProcessor, MockBackendFactory, ModelCache, RemovalConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use std::sync::Arc;

fn subject_image(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        Rgb([(x * 255 / size) as u8, (y * 255 / size) as u8, 128])
    })
}

/// Soft-edged disc covering the center of the frame
fn subject_mask(size: u32) -> GrayImage {
    let center = size as f32 / 2.0;
    let radius = size as f32 / 3.0;
    GrayImage::from_fn(size, size, |x, y| {
        let distance = ((x as f32 - center).powi(2) + (y as f32 - center).powi(2)).sqrt();
        let value = ((radius - distance) * 16.0 + 128.0).clamp(0.0, 255.0);
        Luma([value as u8])
    })
}

fn bench_matting_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("matting");
    group.sample_size(10);

    for size in [256u32, 512] {
        let image = subject_image(size);
        let mask = subject_mask(size);

        for mode in ProcessingMode::ALL {
            let Some(pass) = mode.passes().first() else {
                continue;
            };
            group.bench_with_input(
                BenchmarkId::new(format!("alpha_matting_{mode}"), size),
                &size,
                |b, _| b.iter(|| alpha_matting_cutout(black_box(&image), black_box(&mask), &pass.matting)),
            );
        }

        let params = FEATHER_PASS.matting;
        group.bench_with_input(BenchmarkId::new("trimap", size), &size, |b, _| {
            b.iter(|| generate_trimap(black_box(&mask), &params));
        });
        group.bench_with_input(BenchmarkId::new("post_process_mask", size), &size, |b, _| {
            b.iter(|| post_process_mask(black_box(&mask)));
        });
    }

    group.finish();
}

fn bench_enhancement(c: &mut Criterion) {
    let mut group = c.benchmark_group("enhancement");
    group.sample_size(10);

    let small = DynamicImage::ImageRgb8(subject_image(480));
    group.bench_function("upscale_480_to_1024", |b| {
        b.iter(|| upscale_to_min_side(black_box(&small), 1024));
    });

    let large = DynamicImage::ImageRgb8(subject_image(1024));
    group.bench_function("sharpen_1024", |b| b.iter(|| sharpen(black_box(&large), 1.2)));

    let cutout = large.to_rgba8();
    group.bench_function("premultiplied_downscale_1024_to_480", |b| {
        b.iter(|| resize_rgba_premultiplied(black_box(&cutout), 480, 480));
    });

    group.finish();
}

fn bench_pipeline_with_mock_backend(c: &mut Criterion) {
    let model_dir = std::env::temp_dir().join("bgremove-web-bench-models");
    let cache = ModelCache::with_custom_cache_dir(&model_dir).expect("model dir");
    let config = RemovalConfig::builder().upscale_min_side(256).build().expect("config");
    let processor = BackgroundRemovalProcessor::with_factory(config, Arc::new(MockBackendFactory::new()), cache)
        .expect("processor");
    let image = DynamicImage::ImageRgb8(subject_image(200));

    let mut group = c.benchmark_group("pipeline_mock");
    group.sample_size(10);
    for mode in ProcessingMode::ALL {
        group.bench_function(mode.as_str(), |b| {
            b.iter(|| processor.process_image(black_box(&image), mode).expect("processing"));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_matting_stages,
    bench_enhancement,
    bench_pipeline_with_mock_backend
);
criterion_main!(benches);
