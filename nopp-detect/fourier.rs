use nopp_core::{AnalysisConfig, ColorImage, Detection, FeatureMap, Method, NoppError, NoppResult};
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{FftDirection, FftPlanner};
use tracing::{debug, warn};

use crate::detector::PillDetector;
use crate::morphology::{Morphology, StructuringElement};
use crate::preprocessing::TexturePreprocessor;
use crate::region::compute_stats;
use crate::utils::{min_max_normalize, percentile_mask};

/// Frequency-domain high-pass filtering of the gray image
#[derive(Debug, Clone, Copy, Default)]
pub struct FourierDetector;

impl PillDetector for FourierDetector {
    fn method(&self) -> Method {
        Method::Fourier
    }

    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        config.validate()?;
        nopp_core::validate_image(image)?;
        let gray = TexturePreprocessor::gray_map(&TexturePreprocessor::to_gray(image));

        let mut filtered = gaussian_highpass(&gray, config.gauss_sigma)?;
        if !min_max_normalize(&mut filtered) {
            warn!("high-pass response is flat, feature map set to zero");
        }

        let (mask, threshold) = percentile_mask(&filtered, config.threshold_percentile)?;
        let mask = Morphology::open(&mask, &StructuringElement::ellipse(5, 5));
        let stats = compute_stats(&mask, &filtered)?;

        debug!(threshold, sigma = config.gauss_sigma, pills = stats.num_pills, "fourier detection");
        Ok(Detection { mask, feature_map: filtered, stats })
    }
}

/// Magnitude of the image after multiplying its spectrum by
/// `1 - exp(-d^2 / (2 sigma^2))`, `d` the distance from the zero frequency
pub fn gaussian_highpass(gray: &FeatureMap, sigma: f64) -> NoppResult<FeatureMap> {
    if !(sigma > 0.0) || !sigma.is_finite() {
        return Err(NoppError::invalid_input(format!("gauss sigma must be positive, got {}", sigma)));
    }
    let (w, h) = (gray.width, gray.height);
    if w == 0 || h == 0 {
        return Err(NoppError::invalid_input("cannot filter an empty image"));
    }

    let mut spectrum: Vec<Complex<f64>> = gray.data.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft_2d(&mut spectrum, w, h, FftDirection::Forward);

    let two_sigma_sq = 2.0 * sigma * sigma;
    spectrum.par_chunks_mut(w).enumerate().for_each(|(ky, row)| {
        let dy = centred_frequency(ky, h);
        for (kx, value) in row.iter_mut().enumerate() {
            let dx = centred_frequency(kx, w);
            let gain = 1.0 - (-(dx * dx + dy * dy) / two_sigma_sq).exp();
            *value *= gain;
        }
    });

    fft_2d(&mut spectrum, w, h, FftDirection::Inverse);
    let scale = 1.0 / (w * h) as f64;
    let data = spectrum.iter().map(|c| c.norm() * scale).collect();
    Ok(FeatureMap { width: w, height: h, data })
}

/// Magnitude of the unnormalized 2D spectrum, zero frequency at the origin
pub fn spectrum_magnitude(gray: &FeatureMap) -> NoppResult<FeatureMap> {
    let (w, h) = (gray.width, gray.height);
    if w == 0 || h == 0 {
        return Err(NoppError::invalid_input("cannot transform an empty image"));
    }
    let mut spectrum: Vec<Complex<f64>> = gray.data.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft_2d(&mut spectrum, w, h, FftDirection::Forward);
    let data = spectrum.iter().map(|c| c.norm()).collect();
    Ok(FeatureMap { width: w, height: h, data })
}

/// Signed offset of an unshifted FFT index from the centred zero frequency
#[inline]
fn centred_frequency(k: usize, n: usize) -> f64 {
    let half = n / 2;
    ((k + half) % n) as f64 - half as f64
}

/// In-place unnormalized 2D transform, row-major `w x h`
fn fft_2d(buffer: &mut [Complex<f64>], w: usize, h: usize, direction: FftDirection) {
    let mut planner = FftPlanner::<f64>::new();

    let row_fft = planner.plan_fft(w, direction);
    buffer.par_chunks_mut(w).for_each(|row| row_fft.process(row));

    let mut transposed = transpose(buffer, w, h);
    let col_fft = planner.plan_fft(h, direction);
    transposed.par_chunks_mut(h).for_each(|col| col_fft.process(col));

    buffer.copy_from_slice(&transpose(&transposed, h, w));
}

fn transpose(src: &[Complex<f64>], w: usize, h: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); w * h];
    for y in 0..h {
        for x in 0..w {
            out[x * h + y] = src[y * w + x];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_centred_frequency() {
        // even length: 0 1 2 3 -> 0 1 -2 -1
        let even: Vec<f64> = (0..4).map(|k| centred_frequency(k, 4)).collect();
        assert_eq!(even, vec![0.0, 1.0, -2.0, -1.0]);
        let odd: Vec<f64> = (0..5).map(|k| centred_frequency(k, 5)).collect();
        assert_eq!(odd, vec![0.0, 1.0, 2.0, -2.0, -1.0]);
    }

    #[test]
    fn test_highpass_removes_constant() {
        let flat = FeatureMap::from_fn(16, 12, |_, _| 120.0);
        let out = gaussian_highpass(&flat, 2.0).unwrap();
        assert!(out.data.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_highpass_keeps_fine_detail() {
        // pixel checkerboard lives at the highest frequency, gain ~1
        let board = FeatureMap::from_fn(16, 16, |x, y| if (x + y) % 2 == 0 { 100.0 } else { 0.0 });
        let out = gaussian_highpass(&board, 2.0).unwrap();
        for v in &out.data {
            assert!((v - 50.0).abs() < 1e-4, "{}", v);
        }
    }

    #[test]
    fn test_invalid_sigma() {
        let map = FeatureMap::new(4, 4);
        assert!(gaussian_highpass(&map, 0.0).is_err());
        assert!(gaussian_highpass(&map, f64::NAN).is_err());
    }

    #[test]
    fn test_spectrum_of_constant_is_a_single_peak() {
        let map = FeatureMap::from_fn(8, 4, |_, _| 2.0);
        let spectrum = spectrum_magnitude(&map).unwrap();
        assert!((spectrum.data[0] - 64.0).abs() < 1e-9);
        assert!(spectrum.data[1..].iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_flat_image_yields_zero_map() {
        let image = ColorImage::from_pixel(32, 32, Rgb([90, 90, 90]));
        let det = FourierDetector.detect(&image, &AnalysisConfig::default()).unwrap();
        assert!(det.feature_map.data.iter().all(|&v| v == 0.0));
        assert_eq!(det.mask.count(), 0);
    }

    #[test]
    fn test_feature_map_normalized() {
        let image = ColorImage::from_fn(40, 40, |x, y| {
            let v = if (x / 4 + y / 4) % 2 == 0 { 200 } else { 40 };
            Rgb([v, v, v])
        });
        let det = FourierDetector.detect(&image, &AnalysisConfig::default()).unwrap();
        assert!((det.feature_map.max() - 1.0).abs() < 1e-12);
        assert!(det.feature_map.min().abs() < 1e-12);
        assert_eq!(det.mask.width, 40);
    }
}
