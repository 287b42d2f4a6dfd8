//! 64-value texture descriptor: intensity moments, LBP histogram, Sobel
//! gradients, spectrum statistics, multi-scale LBP spread and a Gabor bank.

use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use nopp_core::{FeatureMap, LbpParams, NoppResult};
use nopp_detect::utils::{mean_std, percentile_sorted, reflect_101};
use nopp_detect::{spectrum_magnitude, TexturePreprocessor};
use rayon::prelude::*;

/// Length of the advanced descriptor
pub const ADVANCED_FEATURES: usize = 64;

const HIST_POINTS: usize = 24;
const HIST_RADIUS: f64 = 3.0;
const HIST_BINS: usize = 26;
/// Upper edge of the histogram range, lower edge is 0
const HIST_RANGE: f64 = 25.0;
const HIST_EPS: f64 = 1e-8;

/// (radius, points) pairs with points <= 8 * radius
const LBP_SCALES: [(f64, usize); 6] = [(1.0, 8), (2.0, 8), (2.0, 16), (3.0, 8), (3.0, 16), (3.0, 24)];

const GABOR_SIZE: usize = 21;
const GABOR_SIGMA: f64 = 5.0;
const GABOR_GAMMA: f64 = 0.5;
const GABOR_ANGLES_DEG: [f64; 4] = [0.0, 45.0, 90.0, 135.0];
const GABOR_FREQUENCIES: [f64; 3] = [0.1, 0.3, 0.5];

pub fn advanced_descriptor(gray: &GrayImage) -> NoppResult<Vec<f64>> {
    let map = TexturePreprocessor::gray_map(gray);
    let mut features = Vec::with_capacity(ADVANCED_FEATURES);

    features.extend(intensity_statistics(&map.data));
    features.extend(lbp_histogram(&map)?);
    features.extend(gradient_statistics(gray));
    features.extend(spectrum_statistics(&map)?);

    for &(radius, points) in &LBP_SCALES {
        let codes = TexturePreprocessor::uniform_lbp(&map, LbpParams { radius, points })?;
        features.push(mean_std(&codes.data).1);
    }

    for &angle in &GABOR_ANGLES_DEG {
        for &frequency in &GABOR_FREQUENCIES {
            let kernel = gabor_kernel(angle.to_radians(), 2.0 * std::f64::consts::PI * frequency);
            features.push(gabor_response_mean(&map, &kernel));
        }
    }

    debug_assert_eq!(features.len(), ADVANCED_FEATURES);
    Ok(features)
}

/// Mean, std, variance, min, max, median, skewness, excess kurtosis
fn intensity_statistics(values: &[f64]) -> [f64; 8] {
    if values.is_empty() {
        return [0.0; 8];
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &v in values {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 { 0.5 * (sorted[mid - 1] + sorted[mid]) } else { sorted[mid] };

    // constant input has no shape
    let (skewness, kurtosis) = if m2 > 0.0 { (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0) } else { (0.0, 0.0) };

    [mean, m2.sqrt(), m2, sorted[0], sorted[sorted.len() - 1], median, skewness, kurtosis]
}

/// 26-bin normalised histogram of LBP(24, 3) codes followed by sum(h * log2 h)
fn lbp_histogram(map: &FeatureMap) -> NoppResult<Vec<f64>> {
    let codes = TexturePreprocessor::uniform_lbp(map, LbpParams { radius: HIST_RADIUS, points: HIST_POINTS })?;
    let mut counts = vec![0.0f64; HIST_BINS];
    for &code in &codes.data {
        if !(0.0..=HIST_RANGE).contains(&code) {
            continue;
        }
        // the last bin is closed on the right
        let bin = ((code / HIST_RANGE * HIST_BINS as f64) as usize).min(HIST_BINS - 1);
        counts[bin] += 1.0;
    }
    let total: f64 = counts.iter().sum();
    let mut hist: Vec<f64> = counts.iter().map(|c| c / (total + HIST_EPS)).collect();
    let entropy = hist.iter().map(|h| h * (h + HIST_EPS).log2()).sum();
    hist.push(entropy);
    Ok(hist)
}

/// Sobel magnitude mean/std, direction mean/std, magnitude 90/95/99th percentiles
fn gradient_statistics(gray: &GrayImage) -> [f64; 7] {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let mut magnitude = Vec::with_capacity(gx.as_raw().len());
    let mut direction = Vec::with_capacity(gx.as_raw().len());
    for (&x, &y) in gx.as_raw().iter().zip(gy.as_raw()) {
        let (x, y) = (x as f64, y as f64);
        magnitude.push(x.hypot(y));
        direction.push(y.atan2(x));
    }
    let (mag_mean, mag_std) = mean_std(&magnitude);
    let (dir_mean, dir_std) = mean_std(&direction);
    magnitude.sort_by(|a, b| a.total_cmp(b));
    [
        mag_mean,
        mag_std,
        dir_mean,
        dir_std,
        percentile_sorted(&magnitude, 90.0),
        percentile_sorted(&magnitude, 95.0),
        percentile_sorted(&magnitude, 99.0),
    ]
}

/// Mean, std, max and energy of log(1 + |F|)
fn spectrum_statistics(map: &FeatureMap) -> NoppResult<[f64; 4]> {
    let spectrum = spectrum_magnitude(map)?;
    let log: Vec<f64> = spectrum.data.iter().map(|m| m.ln_1p()).collect();
    let (mean, std) = mean_std(&log);
    let max = log.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let energy = log.iter().map(|v| v * v).sum();
    Ok([mean, std, max, energy])
}

/// Real 21x21 Gabor kernel (sigma 5, aspect 0.5, zero phase), laid out for correlation
pub fn gabor_kernel(theta: f64, wavelength: f64) -> Vec<f64> {
    let half = (GABOR_SIZE / 2) as isize;
    let sigma_x = GABOR_SIGMA;
    let sigma_y = GABOR_SIGMA / GABOR_GAMMA;
    let ex = -0.5 / (sigma_x * sigma_x);
    let ey = -0.5 / (sigma_y * sigma_y);
    let scale = 2.0 * std::f64::consts::PI / wavelength;
    let (s, c) = theta.sin_cos();

    let mut kernel = vec![0.0; GABOR_SIZE * GABOR_SIZE];
    for y in -half..=half {
        for x in -half..=half {
            let xr = x as f64 * c + y as f64 * s;
            let yr = -(x as f64) * s + y as f64 * c;
            let v = (ex * xr * xr + ey * yr * yr).exp() * (scale * xr).cos();
            let row = (half - y) as usize;
            let col = (half - x) as usize;
            kernel[row * GABOR_SIZE + col] = v;
        }
    }
    kernel
}

/// Mean of the correlation response saturated to 0..=255, mirrored borders
fn gabor_response_mean(map: &FeatureMap, kernel: &[f64]) -> f64 {
    let (w, h) = (map.width, map.height);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let half = (GABOR_SIZE / 2) as isize;
    let window = |i: usize, n: usize| -> Vec<usize> { (-half..=half).map(|d| reflect_101(i as isize + d, n)).collect() };
    let columns: Vec<Vec<usize>> = (0..w).map(|x| window(x, w)).collect();
    let total: f64 = (0..h)
        .into_par_iter()
        .map(|y| {
            let rows = window(y, h);
            let mut row_sum = 0.0;
            for cols in &columns {
                let mut acc = 0.0;
                for (ky, &sy) in rows.iter().enumerate() {
                    let src = &map.data[sy * w..(sy + 1) * w];
                    let taps = &kernel[ky * GABOR_SIZE..(ky + 1) * GABOR_SIZE];
                    for (k, &sx) in taps.iter().zip(cols) {
                        acc += k * src[sx];
                    }
                }
                row_sum += acc.round().clamp(0.0, 255.0);
            }
            row_sum
        })
        .sum();
    total / (w * h) as f64
}
