//! Core types, configuration and errors shared by the pilling analysis crates.

pub mod builder;
pub mod config;
pub mod error;
pub mod types;
pub mod units;

pub use builder::AnalysisConfigBuilder;
pub use config::{AnalysisConfig, ChannelWeights, ClassifierKind, LbpParams, WaveletFamily};
pub use error::{ErrorKind, NoppError, NoppResult};
pub use types::{
    ColorImage, Detection, FeatureMap, GradeSummary, Mask, MemberVotes, Method, PillingGrade, Stats, VoteSummary,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Optional numerical backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Capability {
    /// Discrete wavelet transform
    Wavelet,
    /// Statistical classifiers for grading
    Learning,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Wavelet => f.write_str("wavelet"),
            Capability::Learning => f.write_str("learning"),
        }
    }
}

/// Which optional backends this build carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capabilities {
    pub wavelet: bool,
    pub learning: bool,
}

impl Capabilities {
    pub fn new(wavelet: bool, learning: bool) -> Self {
        Self { wavelet, learning }
    }

    pub fn all() -> Self {
        Self { wavelet: true, learning: true }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Wavelet => self.wavelet,
            Capability::Learning => self.learning,
        }
    }

    /// Methods whose backend is present
    pub fn supports(&self, method: Method) -> bool {
        method.required_capability().map_or(true, |cap| self.has(cap))
    }
}

/// Thread count for a configured value, 0 meaning one per core
pub fn resolve_threads(n_threads: usize) -> usize {
    if n_threads == 0 {
        num_cpus::get().max(1)
    } else {
        n_threads
    }
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(resolve_threads(n_threads))
        .build_global()
}

/// Reject images the detectors cannot work on
pub fn validate_image(image: &ColorImage) -> NoppResult<()> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(NoppError::invalid_input(format!("image is empty ({}x{})", w, h)));
    }
    Ok(())
}

/// Wrap a raw interleaved buffer, which must hold exactly three channels
pub fn color_image_from_raw(width: u32, height: u32, channels: usize, data: Vec<u8>) -> NoppResult<ColorImage> {
    if channels != 3 {
        return Err(NoppError::invalid_input(format!(
            "expected a 3-channel colour image, got {} channel(s)",
            channels
        )));
    }
    let expected = width as usize * height as usize * 3;
    if data.len() != expected {
        return Err(NoppError::invalid_input(format!(
            "image data length mismatch: expected {}, got {}",
            expected,
            data.len()
        )));
    }
    let image = ColorImage::from_raw(width, height, data)
        .ok_or_else(|| NoppError::invalid_input("image buffer does not match its dimensions"))?;
    validate_image(&image)?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_support() {
        let caps = Capabilities::new(false, true);
        assert!(caps.supports(Method::LbpVariance));
        assert!(caps.supports(Method::Combined));
        assert!(!caps.supports(Method::Wavelet));
        assert!(caps.supports(Method::Dpca));
        assert!(Capabilities::all().supports(Method::Wavelet));
    }

    #[test]
    fn test_resolve_threads() {
        assert_eq!(resolve_threads(0), num_cpus::get().max(1));
        assert_eq!(resolve_threads(3), 3);
    }

    #[test]
    fn test_color_image_from_raw() {
        assert!(color_image_from_raw(2, 2, 3, vec![0; 12]).is_ok());
        let err = color_image_from_raw(2, 2, 4, vec![0; 16]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(color_image_from_raw(2, 2, 3, vec![0; 11]).is_err());
        assert!(color_image_from_raw(0, 2, 3, vec![]).is_err());
    }
}
