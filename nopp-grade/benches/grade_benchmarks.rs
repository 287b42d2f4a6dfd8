use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::Rgb;
use nopp_core::{AnalysisConfig, ClassifierKind, ColorImage, PillingGrade};
use nopp_detect::{PillDetector, TexturePreprocessor};
use nopp_grade::{advanced_descriptor, dpca_descriptor, dpca_feature_map, grade_mask, DpcaDetector, LearnerParams};

/// Knitted ground with a few bright pills
fn create_benchmark_image(size: u32) -> ColorImage {
    ColorImage::from_fn(size, size, |x, y| {
        let pill = (x % 37 < 6) && (y % 29 < 6);
        if pill {
            Rgb([220, 215, 210])
        } else {
            let weave = ((x % 4) * 6 + (y % 3) * 5) as u8;
            Rgb([60 + weave, 70 + weave, 90])
        }
    })
}

fn bench_descriptors(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptors");
    for &size in &[64u32, 128] {
        let gray = TexturePreprocessor::to_gray(&create_benchmark_image(size));
        let map = TexturePreprocessor::gray_map(&gray);
        let label = format!("{}x{}", size, size);

        group.bench_with_input(BenchmarkId::new("dpca", &label), &map, |b, map| {
            b.iter(|| black_box(dpca_descriptor(black_box(map), 5, 8).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("advanced", &label), &gray, |b, gray| {
            b.iter(|| black_box(advanced_descriptor(black_box(gray)).unwrap()))
        });
    }
    group.finish();
}

fn bench_grade_mask(c: &mut Criterion) {
    let gray = TexturePreprocessor::to_gray(&create_benchmark_image(256));
    let map = TexturePreprocessor::gray_map(&gray);
    let mut group = c.benchmark_group("grade_mask");
    for &step in &[1usize, 2, 4] {
        group.bench_with_input(BenchmarkId::new("feature_map_step", step), &step, |b, &step| {
            b.iter(|| black_box(dpca_feature_map(black_box(&map), 7, step).unwrap()))
        });
    }
    let feature = dpca_feature_map(&map, 7, 1).unwrap();
    group.bench_function("mask_moderate", |b| {
        b.iter(|| black_box(grade_mask(black_box(&feature), PillingGrade::MODERATE, 20).unwrap()))
    });
    group.finish();
}

fn bench_detector(c: &mut Criterion) {
    let image = create_benchmark_image(128);
    let mut group = c.benchmark_group("dpca_detector");
    group.sample_size(10);
    for kind in [ClassifierKind::Threshold, ClassifierKind::RandomForest] {
        let config = AnalysisConfig { classifier: kind, samples_per_grade: 40, n_threads: 1, ..AnalysisConfig::default() };
        let detector = DpcaDetector::with_params(LearnerParams::fast());
        group.bench_function(kind.key(), |b| b.iter(|| detector.detect(black_box(&image), &config)));
    }
    group.finish();
}

criterion_group!(benches, bench_descriptors, bench_grade_mask, bench_detector);
criterion_main!(benches);
