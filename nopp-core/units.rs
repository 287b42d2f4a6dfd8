/// Patch sizes offered for the patch-PCA detector
pub const PATCH_SIZES: [usize; 9] = [3, 5, 7, 9, 11, 13, 15, 17, 19];

/// Typical pill diameter the recommendation aims at
const TARGET_PILL_MM: f64 = 3.0;
/// Patch edge relative to the pill it should contain
const PATCH_TO_PILL: f64 = 1.8;

/// Pixel length to millimetres
pub fn pixels_to_mm(pixels: f64, cm_per_px: f64) -> f64 {
    pixels * cm_per_px * 10.0
}

/// Millimetre length to pixels
pub fn mm_to_pixels(mm: f64, cm_per_px: f64) -> f64 {
    mm / (cm_per_px * 10.0)
}

/// Physical edge length of a square patch
pub fn patch_size_mm(patch_px: usize, cm_per_px: f64) -> f64 {
    pixels_to_mm(patch_px as f64, cm_per_px)
}

/// Pixel area to square millimetres
pub fn area_to_mm2(area_px: f64, cm_per_px: f64) -> f64 {
    let mm = cm_per_px * 10.0;
    area_px * mm * mm
}

/// Patch size for a 3 mm pill at the given scale, snapped to the offered sizes.
/// Ties resolve to the smaller size.
pub fn recommend_patch_size(cm_per_px: f64) -> usize {
    let target = (mm_to_pixels(TARGET_PILL_MM, cm_per_px) * PATCH_TO_PILL).floor();
    let target = if target.is_finite() { target } else { f64::MAX };
    let mut best = PATCH_SIZES[0];
    let mut best_dist = f64::INFINITY;
    for &size in &PATCH_SIZES {
        let dist = (size as f64 - target).abs();
        if dist < best_dist {
            best = size;
            best_dist = dist;
        }
    }
    best
}

/// Pill diameter a patch size is tuned for
pub fn pill_diameter_for_patch(patch_px: usize, cm_per_px: f64) -> f64 {
    patch_size_mm(patch_px, cm_per_px) / PATCH_TO_PILL
}

/// Work reduction of the stride grid relative to full sampling
pub fn sampling_speedup(step: usize) -> usize {
    step * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_size_mm() {
        assert!((patch_size_mm(5, 0.1) - 5.0).abs() < 1e-12);
        assert!((patch_size_mm(9, 0.02) - 1.8).abs() < 1e-12);
        assert!((area_to_mm2(49.0, 0.1) - 49.0).abs() < 1e-9);
    }

    #[test]
    fn test_recommend_patch_size() {
        assert_eq!(recommend_patch_size(0.1), 5);
        assert_eq!(recommend_patch_size(0.05), 9);
        assert_eq!(recommend_patch_size(0.02), 19);
        assert_eq!(recommend_patch_size(1.0), 3);
        assert!(PATCH_SIZES.contains(&recommend_patch_size(0.033)));
    }

    #[test]
    fn test_pill_diameter_for_patch() {
        assert!((pill_diameter_for_patch(9, 0.1) - 5.0).abs() < 1e-9);
        assert_eq!(sampling_speedup(3), 9);
    }
}
