use nopp_core::{AnalysisConfig, ColorImage, Detection, FeatureMap, Method, NoppResult};
use rayon::prelude::*;
use tracing::debug;

use crate::detector::PillDetector;
use crate::morphology::{Morphology, StructuringElement};
use crate::preprocessing::TexturePreprocessor;
use crate::region::compute_stats;
use crate::utils::{percentile_mask, reflect};

/// Edge of the square variance window
pub const VARIANCE_WINDOW: usize = 9;

/// Local texture irregularity: variance of per-channel LBP codes
#[derive(Debug, Clone, Copy, Default)]
pub struct LbpVarianceDetector;

impl PillDetector for LbpVarianceDetector {
    fn method(&self) -> Method {
        Method::LbpVariance
    }

    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        config.validate()?;
        let pre = TexturePreprocessor::preprocess(image, config.lbp)?;
        let weights = config.channel_weights.normalized()?;

        let variances: Vec<FeatureMap> = pre.lbp.iter().map(|lbp| local_variance(lbp, VARIANCE_WINDOW)).collect();
        let (w, h) = (variances[0].width, variances[0].height);
        let data = (0..w * h)
            .map(|i| weights[0] * variances[0].data[i] + weights[1] * variances[1].data[i] + weights[2] * variances[2].data[i])
            .collect();
        let combined = FeatureMap { width: w, height: h, data }.sanitized();

        let (mask, threshold) = percentile_mask(&combined, config.threshold_percentile)?;
        let mask = Morphology::open(&mask, &StructuringElement::ellipse(5, 5));
        let stats = compute_stats(&mask, &combined)?;

        debug!(threshold, pills = stats.num_pills, coverage = stats.nop_percentage, "lbp variance detection");
        Ok(Detection { mask, feature_map: combined, stats })
    }
}

/// Population variance over a `size x size` window, mirrored at the border
pub fn local_variance(map: &FeatureMap, size: usize) -> FeatureMap {
    let (w, h) = (map.width, map.height);
    if w == 0 || h == 0 {
        return map.clone();
    }
    let half = (size / 2) as isize;
    let pw = w + size - 1;
    let ph = h + size - 1;

    // integral images of the mirrored map, one extra leading row and column
    let stride = pw + 1;
    let mut sum = vec![0.0f64; stride * (ph + 1)];
    let mut sum_sq = vec![0.0f64; stride * (ph + 1)];
    for py in 0..ph {
        let sy = reflect(py as isize - half, h);
        let mut row_sum = 0.0;
        let mut row_sq = 0.0;
        for px in 0..pw {
            let sx = reflect(px as isize - half, w);
            let v = map.data[sy * w + sx];
            row_sum += v;
            row_sq += v * v;
            let idx = (py + 1) * stride + px + 1;
            sum[idx] = sum[idx - stride] + row_sum;
            sum_sq[idx] = sum_sq[idx - stride] + row_sq;
        }
    }

    let n = (size * size) as f64;
    let data: Vec<f64> = (0..h)
        .into_par_iter()
        .flat_map_iter(|y| {
            let (sum, sum_sq) = (&sum, &sum_sq);
            (0..w).map(move |x| {
                let (x0, y0, x1, y1) = (x, y, x + size, y + size);
                let s = sum[y1 * stride + x1] - sum[y0 * stride + x1] - sum[y1 * stride + x0] + sum[y0 * stride + x0];
                let q = sum_sq[y1 * stride + x1] - sum_sq[y0 * stride + x1] - sum_sq[y1 * stride + x0]
                    + sum_sq[y0 * stride + x0];
                let mean = s / n;
                (q / n - mean * mean).max(0.0)
            })
        })
        .collect();

    FeatureMap { width: w, height: h, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use nopp_core::ChannelWeights;

    fn brute_variance(map: &FeatureMap, size: usize, x: usize, y: usize) -> f64 {
        let half = (size / 2) as isize;
        let mut values = Vec::new();
        for dy in -half..=half {
            for dx in -half..=half {
                let sx = reflect(x as isize + dx, map.width);
                let sy = reflect(y as isize + dy, map.height);
                values.push(map.get(sx, sy));
            }
        }
        crate::utils::mean_std(&values).1.powi(2)
    }

    /// Red-only texture: random-looking speckle on the red channel, other channels black
    fn red_texture_image(size: u32) -> ColorImage {
        ColorImage::from_fn(size, size, |x, y| {
            let v = ((x * 7919 + y * 104_729 + x * y * 31) % 97) as u8;
            Rgb([v.saturating_mul(2), 0, 0])
        })
    }

    #[test]
    fn test_local_variance_matches_brute_force() {
        let map = FeatureMap::from_fn(13, 11, |x, y| ((x * 5 + y * 3) % 10) as f64);
        let var = local_variance(&map, 9);
        for &(x, y) in &[(0, 0), (6, 5), (12, 10), (3, 9)] {
            assert!((var.get(x, y) - brute_variance(&map, 9, x, y)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_black_image_has_zero_variance_and_no_pills() {
        let image = ColorImage::new(40, 40);
        let det = LbpVarianceDetector.detect(&image, &AnalysisConfig::default()).unwrap();
        assert!(det.feature_map.data.iter().all(|&v| v == 0.0));
        assert_eq!(det.mask.count(), 0);
        assert_eq!(det.stats.num_pills, 0);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let image = red_texture_image(64);
        let mut previous = usize::MAX;
        for p in [70.0, 75.0, 80.0, 85.0, 90.0, 95.0] {
            let config = AnalysisConfig { threshold_percentile: p, ..AnalysisConfig::default() };
            let det = LbpVarianceDetector.detect(&image, &config).unwrap();
            let count = det.mask.count();
            assert!(count <= previous, "percentile {} gave {} > {}", p, count, previous);
            previous = count;
        }
    }

    #[test]
    fn test_channel_weighting_red_texture() {
        let image = red_texture_image(64);
        let red_only = AnalysisConfig {
            channel_weights: ChannelWeights::new(1.0, 0.0, 0.0),
            ..AnalysisConfig::default()
        };
        let balanced = AnalysisConfig {
            channel_weights: ChannelWeights::new(0.33, 0.33, 0.34),
            ..AnalysisConfig::default()
        };
        let a = LbpVarianceDetector.detect(&image, &red_only).unwrap();
        let b = LbpVarianceDetector.detect(&image, &balanced).unwrap();
        assert!(a.mask.count() >= b.mask.count());
    }
}
