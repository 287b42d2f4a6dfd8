//! Pixel-level pilling detectors: LBP variance, Fourier high-pass,
//! morphological watershed, wavelet energy and their majority-vote ensemble.

pub mod detector;
pub mod ensemble;
pub mod fourier;
pub mod lbp_variance;
pub mod morphology;
pub mod preprocessing;
pub mod region;
pub mod types;
pub mod utils;
pub mod watershed;
#[cfg(feature = "wavelet")]
pub mod wavelet;

pub use detector::PillDetector;
pub use ensemble::{default_members, majority_vote, pixel_detector, EnsembleDetector};
pub use fourier::{spectrum_magnitude, FourierDetector};
pub use lbp_variance::LbpVarianceDetector;
pub use morphology::{Morphology, StructuringElement};
pub use preprocessing::{average_color, crop_roi, suggest_channel_weights, Preprocessed, TexturePreprocessor};
pub use region::{compute_stats, regions, remove_small_components};
pub use types::Region;
pub use watershed::MorphologicalDetector;
#[cfg(feature = "wavelet")]
pub use wavelet::WaveletDetector;

use nopp_core::{AnalysisConfig, ColorImage, Detection, NoppResult};

/// Whether this build carries the wavelet backend
pub fn wavelet_available() -> bool {
    cfg!(feature = "wavelet")
}

pub fn detect_lbp_variance(image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
    LbpVarianceDetector.detect(image, config)
}

pub fn detect_fourier(image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
    FourierDetector.detect(image, config)
}

pub fn detect_morphological(image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
    MorphologicalDetector.detect(image, config)
}

/// Fails with `MissingCapability` when built without the `wavelet` feature
pub fn detect_wavelet(image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
    pixel_detector(nopp_core::Method::Wavelet)?.detect(image, config)
}

/// Majority vote of the configured (or default) pixel detectors
pub fn detect_combined(image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
    EnsembleDetector::for_config(config)?.detect(image, config)
}
