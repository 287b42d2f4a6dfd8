use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use nopp_cli::nopp_core::{units, AnalysisConfig, ClassifierKind, WaveletFamily};
use nopp_cli::nopp_detect::{average_color, crop_roi, suggest_channel_weights};
use nopp_cli::nopp_grade::LearnerParams;
use nopp_cli::{
    is_large_image, parse_roi, parse_weights, probe_capabilities, render_overlay, render_stats, Analyzer, ColorImage,
    Job, JobOutput, Method, MethodRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "nopp", version, about = "Textile pilling detection and severity grading")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one detection method on an image.
    Analyze {
        image: PathBuf,

        /// Method key: lbp_variance, fourier, morphological, wavelet, combined, dpca.
        #[arg(long, default_value = "lbp_variance")]
        method: String,

        /// Write the image with detected pills highlighted.
        #[arg(long)]
        overlay: Option<PathBuf>,

        #[command(flatten)]
        settings: Settings,
    },

    /// Run every available method and print a comparison.
    Compare {
        image: PathBuf,

        /// Include wavelet, combined and dpca.
        #[arg(long)]
        experimental: bool,

        #[command(flatten)]
        settings: Settings,
    },

    /// List the optional backends compiled into this build.
    Capabilities,

    /// Channel weights suited to the garment colour of an image.
    SuggestWeights {
        image: PathBuf,

        #[arg(long)]
        roi: Option<String>,
    },

    /// Patch size for a 3 mm pill at the given scale.
    RecommendPatch {
        /// Image resolution in cm per pixel.
        #[arg(long)]
        resolution: f64,
    },

    /// Print or save a configuration preset.
    Config {
        #[arg(long, default_value = "standard")]
        preset: String,

        #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,

        /// Save to this file instead of printing.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Json,
    Toml,
}

/// Configuration sources and per-knob overrides shared by the analysis commands
#[derive(Debug, Clone, Args)]
struct Settings {
    /// Configuration file (.json or .toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Named preset: standard, fine_pills, coarse_pills, research.
    #[arg(long, conflicts_with = "config")]
    preset: Option<String>,

    /// Crop to x1,y1,x2,y2 before analysis.
    #[arg(long)]
    roi: Option<String>,

    /// Worker threads for the pixel loops, 0 for one per core.
    #[arg(long)]
    threads: Option<usize>,

    /// Print statistics as JSON.
    #[arg(long)]
    json: bool,

    #[arg(long)]
    percentile: Option<f64>,

    /// Channel weights r,g,b.
    #[arg(long)]
    weights: Option<String>,

    #[arg(long)]
    sigma: Option<f64>,

    /// Wavelet family of the energy detector.
    #[arg(long, value_parser = wavelet_names())]
    wavelet: Option<String>,

    #[arg(long)]
    patch_size: Option<usize>,

    #[arg(long)]
    step: Option<usize>,

    /// Resolution in cm per pixel.
    #[arg(long)]
    resolution: Option<f64>,

    #[arg(long)]
    filters: Option<usize>,

    /// threshold, svm, neural_network, deep_network, random_forest, ensemble.
    #[arg(long)]
    classifier: Option<String>,

    /// Use the 64-value texture descriptor for grading.
    #[arg(long)]
    extended: bool,

    /// Report cross-validated accuracy of the learned classifier.
    #[arg(long)]
    cross_validation: bool,

    #[arg(long)]
    min_area: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Small training budget for the learned classifiers.
    #[arg(long)]
    fast_training: bool,
}

/// `--wavelet` accepts exactly the families the detector implements
fn wavelet_names() -> PossibleValuesParser {
    PossibleValuesParser::new(WaveletFamily::ALL.map(|w| w.name()))
}

impl Settings {
    fn load_config(&self) -> Result<AnalysisConfig> {
        let base = match (&self.config, &self.preset) {
            (Some(path), _) => {
                AnalysisConfig::load(path).with_context(|| format!("loading config {}", path.display()))?
            }
            (None, Some(name)) => AnalysisConfig::preset(name)?,
            (None, None) => AnalysisConfig::default(),
        };

        let mut builder = base.to_builder();
        if let Some(p) = self.percentile {
            builder = builder.threshold_percentile(p);
        }
        if let Some(text) = &self.weights {
            let [r, g, b] = parse_weights(text)?;
            builder = builder.channel_weights(r, g, b);
        }
        if let Some(sigma) = self.sigma {
            builder = builder.gauss_sigma(sigma);
        }
        if let Some(name) = &self.wavelet {
            builder = builder.wavelet(name.parse::<WaveletFamily>()?);
        }
        if let Some(size) = self.patch_size {
            builder = builder.patch_size(size);
        }
        if let Some(step) = self.step {
            builder = builder.sampling_step(step);
        }
        if let Some(res) = self.resolution {
            builder = builder.resolution(res);
        }
        if let Some(n) = self.filters {
            builder = builder.num_filters(n);
        }
        if let Some(name) = &self.classifier {
            builder = builder.classifier(name.parse::<ClassifierKind>()?);
        }
        if self.extended {
            builder = builder.extended_features(true);
        }
        if self.cross_validation {
            builder = builder.cross_validation(true);
        }
        if let Some(area) = self.min_area {
            builder = builder.min_pill_area(area);
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(n) = self.threads {
            builder = builder.threads(n);
        }
        Ok(builder.build()?)
    }

    fn learner(&self) -> LearnerParams {
        if self.fast_training {
            LearnerParams::fast()
        } else {
            LearnerParams::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { image, method, overlay, settings } => run_analyze(&image, &method, overlay.as_deref(), &settings),
        Command::Compare { image, experimental, settings } => run_compare(&image, experimental, &settings),
        Command::Capabilities => run_capabilities(),
        Command::SuggestWeights { image, roi } => run_suggest_weights(&image, roi.as_deref()),
        Command::RecommendPatch { resolution } => run_recommend_patch(resolution),
        Command::Config { preset, format, output } => run_config(&preset, format, output.as_deref()),
    }
}

fn load_image(path: &Path, roi: Option<&str>) -> Result<ColorImage> {
    let image = image::open(path).with_context(|| format!("opening image {}", path.display()))?.to_rgb8();
    let image = match roi {
        Some(text) => {
            let (x1, y1, x2, y2) = parse_roi(text)?;
            crop_roi(&image, x1, y1, x2, y2)?
        }
        None => image,
    };
    if is_large_image(&image) {
        warn!(width = image.width(), height = image.height(), "large image, analysis may be slow");
    }
    Ok(image)
}

/// Pool size must be set before the first parallel loop
fn init_threads(config: &AnalysisConfig) {
    if let Err(err) = nopp_cli::nopp_core::init_thread_pool(config.n_threads) {
        warn!(error = %err, "keeping the existing thread pool");
    }
}

fn run_job(analyzer: &Analyzer, image: ColorImage, config: AnalysisConfig, job: Job) -> Result<JobOutput> {
    let Some(task) = analyzer.submit(image, config, job) else {
        bail!("an analysis is already running");
    };
    Ok(task.wait()?)
}

fn run_analyze(path: &Path, method: &str, overlay: Option<&Path>, settings: &Settings) -> Result<()> {
    let method: Method = method.parse()?;
    let config = settings.load_config()?;
    init_threads(&config);
    let image = load_image(path, settings.roi.as_deref())?;

    let analyzer = Analyzer::new(MethodRegistry::new(true).with_learner(settings.learner()));
    let t0 = Instant::now();
    let output = run_job(&analyzer, image.clone(), config, Job::Single(method))?;
    let JobOutput::Single(result) = output else {
        bail!("unexpected output for a single-method job");
    };
    let detection = result.with_context(|| format!("{} failed", method.name()))?;
    info!(method = method.key(), elapsed = ?t0.elapsed(), "analysis finished");

    if settings.json {
        println!("{}", serde_json::to_string_pretty(&detection.stats)?);
    } else {
        print!("{}", render_stats(method, &detection.stats));
    }

    if let Some(out) = overlay {
        render_overlay(&image, &detection.mask)?
            .save(out)
            .with_context(|| format!("writing overlay {}", out.display()))?;
        info!(path = %out.display(), "overlay saved");
    }
    Ok(())
}

fn run_compare(path: &Path, experimental: bool, settings: &Settings) -> Result<()> {
    let config = settings.load_config()?;
    init_threads(&config);
    let image = load_image(path, settings.roi.as_deref())?;

    let registry = MethodRegistry::new(experimental).with_learner(settings.learner());
    let methods: Vec<&str> = registry.available().iter().map(|m| m.key()).collect();
    info!(methods = ?methods, "comparing");
    let analyzer = Analyzer::new(registry);
    let JobOutput::Compare(report) = run_job(&analyzer, image, config, Job::Compare)? else {
        bail!("unexpected output for a comparison job");
    };

    if settings.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render());
    }
    if report.results.is_empty() {
        bail!("every method failed");
    }
    Ok(())
}

fn run_capabilities() -> Result<()> {
    let caps = probe_capabilities();
    println!("wavelet:  {}", if caps.wavelet { "available" } else { "not compiled in" });
    println!("learning: {}", if caps.learning { "available" } else { "not compiled in" });
    println!();
    println!("methods:");
    for method in Method::ALL {
        let kind = if method.is_basic() { "basic" } else { "experimental" };
        let state = if caps.supports(method) { "" } else { " (unavailable)" };
        println!("  {:<15} {:<20} {}{}", method.key(), method.name(), kind, state);
    }
    Ok(())
}

fn run_suggest_weights(path: &Path, roi: Option<&str>) -> Result<()> {
    let image = load_image(path, roi)?;
    let avg = average_color(&image)?;
    let w = suggest_channel_weights(avg);
    println!("average colour: R {:.1}, G {:.1}, B {:.1}", avg[0], avg[1], avg[2]);
    println!("suggested weights: {:.3},{:.3},{:.3}", w.red, w.green, w.blue);
    Ok(())
}

fn run_recommend_patch(resolution: f64) -> Result<()> {
    if !resolution.is_finite() || resolution <= 0.0 {
        bail!("resolution must be a positive number of cm per pixel");
    }
    let patch = units::recommend_patch_size(resolution);
    println!("recommended patch: {}x{} px ({:.1} mm)", patch, patch, units::patch_size_mm(patch, resolution));
    println!("tuned for pills of about {:.1} mm", units::pill_diameter_for_patch(patch, resolution));
    for size in units::PATCH_SIZES {
        println!("  {:>2} px = {:>5.1} mm", size, units::patch_size_mm(size, resolution));
    }
    Ok(())
}

fn run_config(preset: &str, format: ConfigFormat, output: Option<&Path>) -> Result<()> {
    let config = AnalysisConfig::preset(preset)?;
    match output {
        Some(path) => {
            match format {
                ConfigFormat::Json => config.save_json(path)?,
                ConfigFormat::Toml => config.save_toml(path)?,
            }
            info!(path = %path.display(), "config saved");
        }
        None => {
            let text = match format {
                ConfigFormat::Json => config.to_json()?,
                ConfigFormat::Toml => config.to_toml()?,
            };
            println!("{}", text);
        }
    }
    Ok(())
}
