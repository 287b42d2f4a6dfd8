use nopp_core::{AnalysisConfig, ColorImage, Detection, FeatureMap, Method, NoppError, NoppResult, WaveletFamily};
use rayon::prelude::*;
use tracing::debug;

use crate::detector::PillDetector;
use crate::morphology::{Morphology, StructuringElement};
use crate::preprocessing::TexturePreprocessor;
use crate::region::compute_stats;
use crate::utils::{percentile_mask, reflect, resize_bilinear};

const DB4_LO: [f64; 8] = [
    -0.010597401784997278,
    0.032883011666982945,
    0.030841381835986965,
    -0.18703481171888114,
    -0.02798376941698385,
    0.6308807679295904,
    0.7148465705525415,
    0.23037781330885523,
];

const DB8_LO: [f64; 16] = [
    -0.00011747678400228192,
    0.0006754494059985568,
    -0.0003917403729959771,
    -0.00487035299301066,
    0.008746094047015655,
    0.013981027917015516,
    -0.04408825393106472,
    -0.01736930100202211,
    0.128747426620186,
    0.00047248457399797254,
    -0.2840155429624281,
    -0.015829105256023893,
    0.5853546836548691,
    0.6756307362980128,
    0.3128715909144659,
    0.05441584224308161,
];

const COIF2_LO: [f64; 12] = [
    -0.0007205494453645122,
    -0.0018232088707029932,
    0.0056114348193944995,
    0.023680171946334084,
    -0.0594344186464569,
    -0.0764885990783064,
    0.41700518442169254,
    0.8127236354455423,
    0.3861100668211622,
    -0.06737255472196302,
    -0.04146493678175915,
    0.016387336463522112,
];

const BIOR22_LO: [f64; 6] = [
    0.0,
    -0.1767766952966369,
    0.3535533905932738,
    1.0606601717798212,
    0.3535533905932738,
    -0.1767766952966369,
];

const BIOR22_HI: [f64; 6] = [0.0, 0.3535533905932738, -0.7071067811865476, 0.3535533905932738, 0.0, 0.0];

/// Analysis filter pair of one wavelet family
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

impl FilterBank {
    pub fn for_family(family: WaveletFamily) -> Self {
        match family {
            WaveletFamily::Haar => {
                let a = std::f64::consts::FRAC_1_SQRT_2;
                Self { low: vec![a, a], high: vec![-a, a] }
            }
            WaveletFamily::Db4 => Self::orthogonal(&DB4_LO),
            WaveletFamily::Db8 => Self::orthogonal(&DB8_LO),
            WaveletFamily::Coif2 => Self::orthogonal(&COIF2_LO),
            WaveletFamily::Bior22 => Self { low: BIOR22_LO.to_vec(), high: BIOR22_HI.to_vec() },
        }
    }

    /// Quadrature mirror of the low-pass filter
    fn orthogonal(low: &[f64]) -> Self {
        let n = low.len();
        let high = (0..n)
            .map(|k| {
                let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
                sign * low[n - 1 - k]
            })
            .collect();
        Self { low: low.to_vec(), high }
    }

    pub fn len(&self) -> usize {
        self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
    }
}

/// One-level decomposition: approximation plus horizontal, vertical and diagonal detail
#[derive(Debug, Clone)]
pub struct Subbands {
    pub approximation: FeatureMap,
    pub horizontal: FeatureMap,
    pub vertical: FeatureMap,
    pub diagonal: FeatureMap,
}

/// Single-level decimated transform of a signal with half-sample symmetric extension.
/// Output length is `(n + taps - 1) / 2`.
pub fn dwt_1d(signal: &[f64], filter: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let taps = filter.len();
    let out_len = (n + taps - 1) / 2;
    (0..out_len)
        .map(|k| {
            let centre = 2 * k as isize + 1;
            filter
                .iter()
                .enumerate()
                .map(|(j, &f)| f * signal[reflect(centre - j as isize, n)])
                .sum()
        })
        .collect()
}

/// Filter every column (decimating rows) then every row (decimating columns)
pub fn dwt_2d(map: &FeatureMap, bank: &FilterBank) -> NoppResult<Subbands> {
    if map.is_empty() {
        return Err(NoppError::invalid_input("cannot decompose an empty map"));
    }
    if bank.is_empty() {
        return Err(NoppError::invalid_input("empty wavelet filter"));
    }
    let (w, h) = (map.width, map.height);

    let columns: Vec<Vec<f64>> = (0..w)
        .into_par_iter()
        .map(|x| (0..h).map(|y| map.data[y * w + x]).collect())
        .collect();
    let col_low: Vec<Vec<f64>> = columns.par_iter().map(|c| dwt_1d(c, &bank.low)).collect();
    let col_high: Vec<Vec<f64>> = columns.par_iter().map(|c| dwt_1d(c, &bank.high)).collect();
    let out_h = col_low[0].len();

    let rows_then = |cols: &[Vec<f64>], filter: &[f64]| -> FeatureMap {
        let rows: Vec<Vec<f64>> = (0..out_h)
            .into_par_iter()
            .map(|y| {
                let row: Vec<f64> = cols.iter().map(|c| c[y]).collect();
                dwt_1d(&row, filter)
            })
            .collect();
        let out_w = rows[0].len();
        FeatureMap { width: out_w, height: out_h, data: rows.concat() }
    };

    Ok(Subbands {
        approximation: rows_then(&col_low, &bank.low),
        horizontal: rows_then(&col_high, &bank.low),
        vertical: rows_then(&col_low, &bank.high),
        diagonal: rows_then(&col_high, &bank.high),
    })
}

/// `sqrt(H^2 + V^2 + D^2)` per coefficient
pub fn detail_energy(bands: &Subbands) -> FeatureMap {
    let data = bands
        .horizontal
        .data
        .iter()
        .zip(&bands.vertical.data)
        .zip(&bands.diagonal.data)
        .map(|((h, v), d)| (h * h + v * v + d * d).sqrt())
        .collect();
    FeatureMap { width: bands.horizontal.width, height: bands.horizontal.height, data }
}

/// Detail energy of a one-level wavelet decomposition, resized back to the image
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveletDetector;

impl PillDetector for WaveletDetector {
    fn method(&self) -> Method {
        Method::Wavelet
    }

    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        config.validate()?;
        nopp_core::validate_image(image)?;
        let gray = TexturePreprocessor::gray_map(&TexturePreprocessor::to_gray(image));

        let bank = FilterBank::for_family(config.wavelet);
        let bands = dwt_2d(&gray, &bank)?;
        let energy = resize_bilinear(&detail_energy(&bands), gray.width, gray.height).sanitized();

        let (mask, threshold) = percentile_mask(&energy, config.threshold_percentile)?;
        let se = StructuringElement::ellipse(3, 3);
        let mask = Morphology::close(&Morphology::open(&mask, &se), &se);
        let stats = compute_stats(&mask, &energy)?;

        debug!(threshold, wavelet = config.wavelet.name(), pills = stats.num_pills, "wavelet detection");
        Ok(Detection { mask, feature_map: energy, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_filter_banks_are_normalized() {
        for family in WaveletFamily::ALL {
            let bank = FilterBank::for_family(family);
            let sum: f64 = bank.low.iter().sum();
            assert!((sum - std::f64::consts::SQRT_2).abs() < 1e-9, "{:?} sum {}", family, sum);
            let high_sum: f64 = bank.high.iter().sum();
            assert!(high_sum.abs() < 1e-9, "{:?} high-pass passes DC", family);
        }
    }

    #[test]
    fn test_haar_transform() {
        let a = std::f64::consts::FRAC_1_SQRT_2;
        let bank = FilterBank::for_family(WaveletFamily::Haar);
        let out = dwt_1d(&[1.0, 3.0, 5.0, 9.0], &bank.low);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 4.0 * a).abs() < 1e-12);
        assert!((out[1] - 14.0 * a).abs() < 1e-12);
        let detail = dwt_1d(&[1.0, 3.0, 5.0, 9.0], &bank.high);
        assert!((detail[0] + 2.0 * a).abs() < 1e-12);
        assert!((detail[1] + 4.0 * a).abs() < 1e-12);
    }

    #[test]
    fn test_output_length() {
        let bank = FilterBank::for_family(WaveletFamily::Db4);
        assert_eq!(dwt_1d(&vec![1.0; 20], &bank.low).len(), 13);
        let map = FeatureMap::from_fn(21, 10, |x, y| (x + y) as f64);
        let bands = dwt_2d(&map, &bank).unwrap();
        assert_eq!((bands.approximation.width, bands.approximation.height), (14, 8));
        assert_eq!(bands.diagonal.len(), 14 * 8);
    }

    #[test]
    fn test_constant_has_no_detail() {
        let map = FeatureMap::from_fn(16, 16, |_, _| 42.0);
        for family in WaveletFamily::ALL {
            let bands = dwt_2d(&map, &FilterBank::for_family(family)).unwrap();
            let energy = detail_energy(&bands);
            assert!(energy.data.iter().all(|v| v.abs() < 1e-9), "{:?}", family);
        }
    }

    #[test]
    fn test_black_image_no_pills() {
        let det = WaveletDetector.detect(&ColorImage::new(32, 32), &AnalysisConfig::default()).unwrap();
        assert_eq!(det.mask.count(), 0);
        assert_eq!(det.feature_map.width, 32);
    }

    #[test]
    fn test_bright_spot_stands_out() {
        let image = ColorImage::from_fn(64, 64, |x, y| {
            if (30..34).contains(&x) && (30..34).contains(&y) {
                Rgb([240, 240, 240])
            } else {
                Rgb([30, 30, 30])
            }
        });
        let det = WaveletDetector.detect(&image, &AnalysisConfig::default()).unwrap();
        assert!(det.feature_map.get(31, 31) > det.feature_map.get(5, 5));
        assert!(det.feature_map.get(5, 5).abs() < 1e-9);
    }
}
