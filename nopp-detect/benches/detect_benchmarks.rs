use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::Rgb;
use nopp_core::{AnalysisConfig, ColorImage, LbpParams};
use nopp_detect::{
    majority_vote, pixel_detector, EnsembleDetector, FourierDetector, LbpVarianceDetector, MorphologicalDetector,
    PillDetector, TexturePreprocessor,
};

/// Fabric-like background with scattered bright pills
fn create_benchmark_image(size: u32, pills: u32) -> ColorImage {
    let mut img = ColorImage::from_fn(size, size, |x, y| {
        let weave = ((x % 4) * 6 + (y % 3) * 5) as u8;
        let noise = ((x * 31 + y * 17) % 11) as u8;
        Rgb([60 + weave + noise, 70 + weave, 90 + noise])
    });

    for i in 0..pills {
        let cx = (i * 7919) % size;
        let cy = (i * 104_729) % size;
        for dy in -3i32..=3 {
            for dx in -3i32..=3 {
                if dx * dx + dy * dy > 9 {
                    continue;
                }
                let x = cx as i32 + dx;
                let y = cy as i32 + dy;
                if x >= 0 && y >= 0 && (x as u32) < size && (y as u32) < size {
                    img.put_pixel(x as u32, y as u32, Rgb([220, 215, 210]));
                }
            }
        }
    }
    img
}

fn create_test_config() -> AnalysisConfig {
    AnalysisConfig { n_threads: 1, ..AnalysisConfig::default() }
}

/// Benchmark each pixel detector at several sizes
fn bench_detectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("detectors");
    let config = create_test_config();

    for &size in &[64u32, 128, 256] {
        let img = create_benchmark_image(size, size / 8);
        let detectors: Vec<Box<dyn PillDetector>> =
            vec![Box::new(LbpVarianceDetector), Box::new(FourierDetector), Box::new(MorphologicalDetector)];

        for detector in &detectors {
            group.bench_with_input(
                BenchmarkId::new(detector.method().key(), format!("{}x{}", size, size)),
                &img,
                |b, img| b.iter(|| black_box(detector.detect(black_box(img), &config).unwrap())),
            );
        }

        if let Ok(wavelet) = pixel_detector(nopp_core::Method::Wavelet) {
            group.bench_with_input(BenchmarkId::new("wavelet", format!("{}x{}", size, size)), &img, |b, img| {
                b.iter(|| black_box(wavelet.detect(black_box(img), &config).unwrap()))
            });
        }
    }

    group.finish();
}

/// Benchmark preprocessing stages
fn bench_preprocessing(c: &mut Criterion) {
    let img = create_benchmark_image(256, 32);
    let mut group = c.benchmark_group("preprocessing");

    group.bench_function("gray", |b| b.iter(|| black_box(TexturePreprocessor::to_gray(black_box(&img)))));

    let red = TexturePreprocessor::channel_map(&img, 0);
    for params in [LbpParams { radius: 1.0, points: 8 }, LbpParams { radius: 3.0, points: 24 }] {
        group.bench_function(format!("uniform_lbp_r{}_p{}", params.radius, params.points), |b| {
            b.iter(|| black_box(TexturePreprocessor::uniform_lbp(black_box(&red), params).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark the ensemble and its vote
fn bench_ensemble(c: &mut Criterion) {
    let img = create_benchmark_image(128, 16);
    let config = create_test_config();
    let mut group = c.benchmark_group("ensemble");

    let ensemble = EnsembleDetector::for_config(&config).unwrap();
    group.bench_function("combined_128x128", |b| b.iter(|| black_box(ensemble.detect(black_box(&img), &config).unwrap())));

    let masks: Vec<_> = [LbpVarianceDetector.detect(&img, &config), FourierDetector.detect(&img, &config)]
        .into_iter()
        .map(|d| d.unwrap().mask)
        .collect();
    group.bench_function("majority_vote", |b| b.iter(|| black_box(majority_vote(black_box(&masks)).unwrap())));

    group.finish();
}

criterion_group!(benches, bench_detectors, bench_preprocessing, bench_ensemble);
criterion_main!(benches);
