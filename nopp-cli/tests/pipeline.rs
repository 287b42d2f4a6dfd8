use std::time::Duration;

use image::Rgb;
use nopp_cli::nopp_core::{AnalysisConfig, ClassifierKind, ErrorKind};
use nopp_cli::{render_overlay, Analyzer, Capabilities, ColorImage, Job, JobOutput, Method, MethodRegistry};

fn five_squares() -> ColorImage {
    let corners = [(10, 10), (60, 12), (100, 15), (20, 80), (75, 90)];
    ColorImage::from_fn(120, 120, |x, y| {
        let inside = corners.iter().any(|&(cx, cy)| x >= cx && x < cx + 7 && y >= cy && y < cy + 7);
        if inside {
            Rgb([230, 230, 230])
        } else {
            Rgb([20, 20, 20])
        }
    })
}

fn knit(size: u32) -> ColorImage {
    ColorImage::from_fn(size, size, |x, y| {
        let v = ((x * 37 + y * 91 + x * y * 7) % 211) as u8;
        Rgb([v, v / 2, 255 - v])
    })
}

#[test]
fn test_morphological_counts_squares_through_registry() {
    let registry = MethodRegistry::new(false);
    let det = registry.run(Method::Morphological, &five_squares(), &AnalysisConfig::default()).unwrap();
    assert_eq!(det.stats.num_pills, 5);
    assert!((36.0..=64.0).contains(&det.stats.avg_pill_area));
}

#[test]
fn test_black_image_is_empty_everywhere() {
    let registry = MethodRegistry::new(true);
    let config = AnalysisConfig { classifier: ClassifierKind::Threshold, ..AnalysisConfig::default() };
    let report = registry.compare(&ColorImage::new(64, 64), &config);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    for (method, det) in &report.results {
        assert_eq!(det.mask.count(), 0, "{}", method);
        assert_eq!(det.stats.num_pills, 0);
        assert_eq!(det.stats.avg_circularity, 0.0);
    }
}

#[test]
fn test_stats_consistency_across_methods() {
    let registry = MethodRegistry::new(true);
    let config = AnalysisConfig { classifier: ClassifierKind::Threshold, ..AnalysisConfig::default() };
    let report = registry.compare(&knit(64), &config);
    for det in report.results.values() {
        let s = &det.stats;
        let expected = s.nop_pixels as f64 / s.total_pixels as f64 * 100.0;
        assert!((s.nop_percentage - expected).abs() < 1e-9);
        assert!(s.avg_circularity >= 0.0 && s.avg_circularity.is_finite());
        if s.num_pills == 0 {
            assert_eq!(s.avg_pill_area, 0.0);
        }
    }
    let rendered = report.render();
    assert!(rendered.contains("LBP + Variance"));
}

#[test]
fn test_analyzer_compare_and_overlay() {
    let analyzer = Analyzer::new(MethodRegistry::with_capabilities(Capabilities::new(false, false), false));
    let image = five_squares();
    let task = analyzer.submit(image.clone(), AnalysisConfig::default(), Job::Compare).unwrap();
    let JobOutput::Compare(report) = task.wait().unwrap() else {
        panic!("expected a comparison");
    };
    assert_eq!(report.results.len(), 3);

    let det = &report.results[&Method::Morphological];
    let overlay = render_overlay(&image, &det.mask).unwrap();
    assert_eq!(overlay.dimensions(), image.dimensions());
    assert!(analyzer.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_config_file_roundtrip_drives_analysis() {
    let dir = std::env::temp_dir().join(format!("nopp-pipeline-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("fine.toml");
    AnalysisConfig::fine_pills().save_toml(&path).unwrap();
    let loaded = AnalysisConfig::load(&path).unwrap();
    assert_eq!(loaded, AnalysisConfig::fine_pills());

    let bad = dir.join("bad.json");
    std::fs::write(&bad, "{ \"patch_size\": 4 }").unwrap();
    assert_eq!(AnalysisConfig::load(&bad).unwrap_err().kind(), ErrorKind::InvalidInput);

    let det = MethodRegistry::new(false).run(Method::Fourier, &knit(48), &loaded).unwrap();
    assert_eq!(det.stats.total_pixels, 48 * 48);
    let _ = std::fs::remove_dir_all(&dir);
}
