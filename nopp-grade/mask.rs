use nopp_core::{FeatureMap, Mask, NoppError, NoppResult, PillingGrade};
use nopp_detect::morphology::{Morphology, StructuringElement};
use nopp_detect::region::remove_small_components;
use nopp_detect::utils::{percentile, threshold_mask};
use rayon::prelude::*;

/// Window of the local-maximum test
const PEAK_WINDOW: usize = 7;
/// Peaks must exceed the grade threshold by this factor
const PEAK_FACTOR: f64 = 1.2;

/// Threshold percentile of the grade mask, stricter for milder grades
pub fn grade_percentile(grade: PillingGrade) -> f64 {
    match grade.value() {
        1 => 85.0,
        2 => 88.0,
        3 => 90.0,
        4 => 93.0,
        _ => 98.0,
    }
}

/// Variance plus mean gradient magnitude of one square window
fn patch_activity(gray: &FeatureMap, cx: usize, cy: usize, patch: usize) -> f64 {
    let half = patch / 2;
    let (x0, y0) = (cx - half, cy - half);
    let at = |x: usize, y: usize| gray.data[(y0 + y) * gray.width + x0 + x];

    let n = (patch * patch) as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut grad = 0.0;
    for y in 0..patch {
        for x in 0..patch {
            let v = at(x, y);
            sum += v;
            sum_sq += v * v;
            let gx = central_difference(x, patch, |i| at(i, y));
            let gy = central_difference(y, patch, |i| at(x, i));
            grad += gx.hypot(gy);
        }
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0) + grad / n
}

/// Derivative along one axis, one-sided at the ends
#[inline]
fn central_difference(i: usize, n: usize, f: impl Fn(usize) -> f64) -> f64 {
    if n < 2 {
        0.0
    } else if i == 0 {
        f(1) - f(0)
    } else if i == n - 1 {
        f(n - 1) - f(n - 2)
    } else {
        0.5 * (f(i + 1) - f(i - 1))
    }
}

/// Window activity sampled every `step` pixels and spread over the block it
/// starts. Pixels no window centre reaches stay zero.
pub fn dpca_feature_map(gray: &FeatureMap, patch_size: usize, sampling_step: usize) -> NoppResult<FeatureMap> {
    if patch_size == 0 || sampling_step == 0 {
        return Err(NoppError::invalid_input(format!(
            "patch size {} and sampling step {} must be positive",
            patch_size, sampling_step
        )));
    }
    let (w, h) = (gray.width, gray.height);
    let half = patch_size / 2;
    let mut map = FeatureMap::new(w, h);
    if w < 2 * half + 1 || h < 2 * half + 1 {
        return Ok(map);
    }

    let centres_y: Vec<usize> = (half..h - half).step_by(sampling_step).collect();
    let centres_x: Vec<usize> = (half..w - half).step_by(sampling_step).collect();
    let rows: Vec<Vec<f64>> = centres_y
        .par_iter()
        .map(|&cy| centres_x.iter().map(|&cx| patch_activity(gray, cx, cy, patch_size)).collect())
        .collect();

    for (&cy, values) in centres_y.iter().zip(&rows) {
        for (&cx, &value) in centres_x.iter().zip(values) {
            for y in cy..(cy + sampling_step).min(h) {
                map.data[y * w + cx..y * w + (cx + sampling_step).min(w)].fill(value);
            }
        }
    }
    Ok(map)
}

/// Pixels equal to their 7x7 neighbourhood maximum and above `floor`
fn local_maxima(map: &FeatureMap, floor: f64) -> Mask {
    let dilated = Morphology::grey_dilate(map, &StructuringElement::rect(PEAK_WINDOW, PEAK_WINDOW));
    let data = map
        .data
        .iter()
        .zip(&dilated.data)
        .map(|(&v, &d)| (v == d && v > floor) as u8)
        .collect();
    Mask { width: map.width, height: map.height, data }
}

/// Pill mask for a known grade: percentile threshold, union with strong
/// peaks, opening, closing, then the area floor
pub fn grade_mask(feature_map: &FeatureMap, grade: PillingGrade, min_pill_area: usize) -> NoppResult<Mask> {
    let threshold = percentile(&feature_map.data, grade_percentile(grade))?;
    let mask = threshold_mask(feature_map, threshold).union(&local_maxima(feature_map, PEAK_FACTOR * threshold));
    let mask = Morphology::open(&mask, &StructuringElement::ellipse(5, 5));
    let mask = Morphology::close(&mask, &StructuringElement::ellipse(3, 3));
    Ok(remove_small_components(&mask, min_pill_area))
}
