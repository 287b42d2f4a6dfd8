//! High-level pilling analysis: method registry, side-by-side comparison,
//! the single-job analyzer and report rendering used by the `nopp` binary.

pub mod analyzer;
pub mod overlay;
pub mod registry;
pub mod report;

pub use analyzer::{AnalysisTask, Analyzer, Job, JobOutput};
pub use overlay::render_overlay;
pub use registry::{probe_capabilities, MethodRegistry};
pub use report::{render_stats, ComparisonReport};

pub use nopp_core::{
    self, AnalysisConfig as Config, Capabilities, ColorImage, Detection, Method, NoppError, NoppResult,
};
pub use nopp_detect;
pub use nopp_grade;

/// Images above this many pixels get a slowness warning
pub const LARGE_IMAGE_PIXELS: u64 = 10_000_000;

pub fn is_large_image(image: &ColorImage) -> bool {
    image.width() as u64 * image.height() as u64 > LARGE_IMAGE_PIXELS
}

/// Parse `x1,y1,x2,y2`
pub fn parse_roi(text: &str) -> NoppResult<(u32, u32, u32, u32)> {
    let parts: Vec<u32> = text
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| NoppError::invalid_input(format!("bad region '{}': {}", text, e)))?;
    match parts[..] {
        [x1, y1, x2, y2] => Ok((x1, y1, x2, y2)),
        _ => Err(NoppError::invalid_input(format!("region '{}' needs four values x1,y1,x2,y2", text))),
    }
}

/// Parse `r,g,b` channel weights
pub fn parse_weights(text: &str) -> NoppResult<[f64; 3]> {
    let parts: Vec<f64> = text
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| NoppError::invalid_input(format!("bad weights '{}': {}", text, e)))?;
    match parts[..] {
        [r, g, b] => Ok([r, g, b]),
        _ => Err(NoppError::invalid_input(format!("weights '{}' need three values r,g,b", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_capabilities_match_features() {
        let caps = probe_capabilities();
        assert_eq!(caps.wavelet, nopp_detect::wavelet_available());
        assert_eq!(caps.learning, nopp_grade::learning_available());
    }

    #[test]
    fn test_parse_roi() {
        assert_eq!(parse_roi("10, 20,300,400").unwrap(), (10, 20, 300, 400));
        assert!(parse_roi("1,2,3").is_err());
        assert!(parse_roi("a,b,c,d").is_err());
    }

    #[test]
    fn test_parse_weights() {
        assert_eq!(parse_weights("0.5,0.25,0.25").unwrap(), [0.5, 0.25, 0.25]);
        assert!(parse_weights("1,2").is_err());
    }

    #[test]
    fn test_large_image_threshold() {
        assert!(!is_large_image(&ColorImage::new(100, 100)));
    }
}
