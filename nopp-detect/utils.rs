/// Numeric helpers shared by the detectors
use nopp_core::{FeatureMap, Mask, NoppError, NoppResult};

/// Percentile with linear interpolation between order statistics
pub fn percentile(values: &[f64], q: f64) -> NoppResult<f64> {
    if values.is_empty() {
        return Err(NoppError::invalid_input("percentile of an empty set"));
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(NoppError::invalid_input(format!("percentile {} outside 0-100", q)));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(percentile_sorted(&sorted, q))
}

/// Same as `percentile` for an already sorted slice
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Pixels strictly above `threshold`
pub fn threshold_mask(map: &FeatureMap, threshold: f64) -> Mask {
    let data = map.data.iter().map(|&v| (v > threshold) as u8).collect();
    Mask { width: map.width, height: map.height, data }
}

/// Threshold at a percentile of the map itself
pub fn percentile_mask(map: &FeatureMap, q: f64) -> NoppResult<(Mask, f64)> {
    let threshold = percentile(&map.data, q)?;
    Ok((threshold_mask(map, threshold), threshold))
}

/// Relative spread below which a map counts as flat (FFT round-off level)
const FLAT_TOLERANCE: f64 = 1e-9;

/// Min-max scale to [0, 1]; a flat map becomes all zeros
pub fn min_max_normalize(map: &mut FeatureMap) -> bool {
    let lo = map.min();
    let hi = map.max();
    let range = hi - lo;
    let scale = hi.abs().max(lo.abs()).max(1.0);
    if !range.is_finite() || range <= FLAT_TOLERANCE * scale {
        map.data.iter_mut().for_each(|v| *v = 0.0);
        return false;
    }
    map.data.iter_mut().for_each(|v| *v = (*v - lo) / range);
    true
}

/// Mirror an index into [0, n) without repeating the edge sample (`dcb|abcd|cba`)
#[inline]
pub fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Mirror an index into [0, n) repeating the edge sample (`dcba|abcd|dcba`)
#[inline]
pub fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}

/// Resize a map with bilinear interpolation on pixel centres
pub fn resize_bilinear(src: &FeatureMap, target_width: usize, target_height: usize) -> FeatureMap {
    if src.is_empty() || target_width == 0 || target_height == 0 {
        return FeatureMap::new(target_width, target_height);
    }
    let x_ratio = src.width as f64 / target_width as f64;
    let y_ratio = src.height as f64 / target_height as f64;

    FeatureMap::from_fn(target_width, target_height, |x, y| {
        let src_x = ((x as f64 + 0.5) * x_ratio - 0.5).max(0.0);
        let src_y = ((y as f64 + 0.5) * y_ratio - 0.5).max(0.0);
        bilinear_sample(src, src_x, src_y)
    })
}

/// Sample a map at fractional coordinates, clamping at the far edges
fn bilinear_sample(map: &FeatureMap, x: f64, y: f64) -> f64 {
    let x1 = (x.floor() as usize).min(map.width - 1);
    let y1 = (y.floor() as usize).min(map.height - 1);
    let x2 = (x1 + 1).min(map.width - 1);
    let y2 = (y1 + 1).min(map.height - 1);

    let fx = (x - x1 as f64).clamp(0.0, 1.0);
    let fy = (y - y1 as f64).clamp(0.0, 1.0);

    let p11 = map.get(x1, y1);
    let p12 = map.get(x2, y1);
    let p21 = map.get(x1, y2);
    let p22 = map.get(x2, y2);

    let interpolated_top = p11 * (1.0 - fx) + p12 * fx;
    let interpolated_bottom = p21 * (1.0 - fx) + p22 * fx;

    interpolated_top * (1.0 - fy) + interpolated_bottom * fy
}

/// Population mean and standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}
