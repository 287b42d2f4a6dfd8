use image::Rgb;
use nopp_cli::nopp_core::{AnalysisConfig, AnalysisConfigBuilder, ClassifierKind};
use nopp_cli::nopp_grade::LearnerParams;
use nopp_cli::{render_overlay, render_stats, ColorImage, Method, MethodRegistry};
use std::time::Instant;

/// Knitted ground with scattered bright fuzz balls
fn synthetic_fabric(size: u32, pills: &[(i64, i64, i64)]) -> ColorImage {
    ColorImage::from_fn(size, size, |x, y| {
        let ground = 70 + ((x * 3 + y * 5) % 11) as u8 + if (x / 4 + y / 4) % 2 == 0 { 8 } else { 0 };
        let on_pill = pills.iter().any(|&(cx, cy, r)| {
            let (dx, dy) = (x as i64 - cx, y as i64 - cy);
            dx * dx + dy * dy <= r * r
        });
        if on_pill {
            Rgb([210, 205, 200])
        } else {
            Rgb([ground, ground / 2 + 20, ground + 30])
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pills = [(30, 30, 4), (90, 40, 5), (60, 100, 3), (140, 130, 4), (120, 70, 6), (40, 150, 4)];
    let image = synthetic_fabric(180, &pills);
    let registry = MethodRegistry::new(true).with_learner(LearnerParams::fast());

    println!("Comparison, standard settings");
    let t0 = Instant::now();
    let report = registry.compare(&image, &AnalysisConfig::standard());
    println!("{}", report.render());
    println!("took {:.2?}\n", t0.elapsed());

    for kind in [ClassifierKind::Threshold, ClassifierKind::RandomForest, ClassifierKind::Ensemble] {
        let config = AnalysisConfigBuilder::new()
            .classifier(kind)
            .samples_per_grade(40)
            .recommended_patch_size()
            .build()?;
        match registry.run(Method::Dpca, &image, &config) {
            Ok(det) => print!("{}", render_stats(Method::Dpca, &det.stats)),
            Err(err) => println!("{}: {}", kind.name(), err),
        }
    }

    if let Some(det) = report.results.get(&Method::Morphological) {
        let path = std::env::temp_dir().join("nopp_grading_demo.png");
        render_overlay(&image, &det.mask)?.save(&path)?;
        println!("\noverlay written to {}", path.display());
    }
    Ok(())
}
