use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use nopp_core::{AnalysisConfig, ColorImage, Detection, FeatureMap, Mask, Method, NoppResult};
use rayon::prelude::*;
use tracing::debug;

use crate::detector::PillDetector;
use crate::morphology::{Morphology, StructuringElement};
use crate::preprocessing::TexturePreprocessor;
use crate::region::{compute_stats, Labels};
use crate::utils::reflect_101;

/// Edge of the elliptical element used by the hat transforms
pub const HAT_KERNEL: usize = 15;
/// Neighbourhood of the adaptive threshold
pub const ADAPTIVE_BLOCK: usize = 11;
/// Offset added to the local mean before comparison
pub const ADAPTIVE_OFFSET: f64 = 2.0;
/// Edge of the maximum filter that selects watershed seeds
pub const SEED_WINDOW: usize = 10;
/// Seeds must exceed this fraction of the largest distance
pub const SEED_FRACTION: f64 = 0.3;

const BLUR_KERNEL: [f64; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Hat-transform contrast enhancement followed by watershed separation of touching pills
#[derive(Debug, Clone, Copy, Default)]
pub struct MorphologicalDetector;

impl PillDetector for MorphologicalDetector {
    fn method(&self) -> Method {
        Method::Morphological
    }

    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        config.validate()?;
        nopp_core::validate_image(image)?;
        let gray = TexturePreprocessor::gray_map(&TexturePreprocessor::to_gray(image));

        let enhanced = enhance_contrast(&gray);
        let blurred = blur_5x5(&enhanced);
        let binary = adaptive_threshold(&blurred, ADAPTIVE_BLOCK, ADAPTIVE_OFFSET);
        let distance = distance_to_background(&binary);
        let markers = seed_markers(&distance);
        let labels = watershed(&distance, &markers, &binary);

        let data = labels.labels.iter().map(|&l| (l > 0) as u8).collect();
        let mask = Mask { width: gray.width, height: gray.height, data };
        let stats = compute_stats(&mask, &enhanced)?;

        debug!(
            foreground = binary.count(),
            seeds = markers.count,
            pills = stats.num_pills,
            "morphological detection"
        );
        Ok(Detection { mask, feature_map: enhanced, stats })
    }
}

/// `gray + tophat - blackhat`, saturating at every step
pub fn enhance_contrast(gray: &FeatureMap) -> FeatureMap {
    let se = StructuringElement::ellipse(HAT_KERNEL, HAT_KERNEL);
    let tophat = Morphology::top_hat(gray, &se);
    let blackhat = Morphology::black_hat(gray, &se);
    let data = gray
        .data
        .iter()
        .zip(tophat.data.iter().zip(&blackhat.data))
        .map(|(&g, (&t, &b))| {
            let brightened = (g + t).min(255.0);
            (brightened - b).max(0.0)
        })
        .collect();
    FeatureMap { width: gray.width, height: gray.height, data }
}

/// Separable binomial 5x5 blur, mirrored border, rounded back to 8-bit levels
pub fn blur_5x5(map: &FeatureMap) -> FeatureMap {
    let blurred = separable_filter(map, &BLUR_KERNEL, reflect_101);
    let data = blurred.data.iter().map(|v| v.round().clamp(0.0, 255.0)).collect();
    FeatureMap { width: map.width, height: map.height, data }
}

/// Normalized Gaussian taps for an odd `size`
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let half = (size / 2) as f64;
    let taps: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

/// Foreground where the pixel exceeds its Gaussian-weighted neighbourhood mean by `offset`
pub fn adaptive_threshold(map: &FeatureMap, block: usize, offset: f64) -> Mask {
    let sigma = 0.3 * ((block as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let kernel = gaussian_kernel(block, sigma);
    let local_mean = separable_filter(map, &kernel, |i, n| i.clamp(0, n as isize - 1) as usize);
    let data = map
        .data
        .iter()
        .zip(&local_mean.data)
        .map(|(&v, &m)| (v > m + offset) as u8)
        .collect();
    Mask { width: map.width, height: map.height, data }
}

fn separable_filter(map: &FeatureMap, kernel: &[f64], border: fn(isize, usize) -> usize) -> FeatureMap {
    let (w, h) = (map.width, map.height);
    let half = (kernel.len() / 2) as isize;

    let horizontal: Vec<f64> = (0..h)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..w).map(move |x| {
                kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| c * map.data[y * w + border(x as isize + k as isize - half, w)])
                    .sum::<f64>()
            })
        })
        .collect();

    let data: Vec<f64> = (0..h)
        .into_par_iter()
        .flat_map_iter(|y| {
            let horizontal = &horizontal;
            (0..w).map(move |x| {
                kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| c * horizontal[border(y as isize + k as isize - half, h) * w + x])
                    .sum::<f64>()
            })
        })
        .collect();

    FeatureMap { width: w, height: h, data }
}

/// Euclidean distance of every foreground pixel to the nearest background pixel
pub fn distance_to_background(binary: &Mask) -> FeatureMap {
    let background = GrayImage::from_fn(binary.width as u32, binary.height as u32, |x, y| {
        Luma([if binary.get(x as usize, y as usize) { 0u8 } else { 255u8 }])
    });
    let squared = euclidean_squared_distance_transform(&background);
    let data = squared
        .pixels()
        .map(|p| {
            let d = p.0[0].sqrt();
            if d.is_finite() { d } else { 0.0 }
        })
        .collect();
    FeatureMap { width: binary.width, height: binary.height, data }
}

/// Plateaus of the windowed maximum above `SEED_FRACTION` of the global maximum,
/// labelled 8-connected
pub fn seed_markers(distance: &FeatureMap) -> Labels {
    let (w, h) = (distance.width, distance.height);
    let global_max = distance.max();
    if !(global_max > 0.0) {
        return Labels { width: w, height: h, labels: vec![0; w * h], count: 0 };
    }
    let floor = SEED_FRACTION * global_max;
    let lo = -((SEED_WINDOW / 2) as isize);
    let hi = lo + SEED_WINDOW as isize - 1;

    let maxima: Vec<bool> = (0..h)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..w).map(move |x| {
                let v = distance.get(x, y);
                if v <= floor {
                    return false;
                }
                let mut window_max = f64::NEG_INFINITY;
                for dy in lo..=hi {
                    let ny = y as isize + dy;
                    if ny < 0 || ny >= h as isize {
                        continue;
                    }
                    for dx in lo..=hi {
                        let nx = x as isize + dx;
                        if nx >= 0 && nx < w as isize {
                            window_max = window_max.max(distance.data[ny as usize * w + nx as usize]);
                        }
                    }
                }
                v == window_max
            })
        })
        .collect();

    label_plateaus(&maxima, w, h)
}

fn label_plateaus(on: &[bool], w: usize, h: usize) -> Labels {
    let mut labels = vec![0u32; w * h];
    let mut count = 0u32;
    let mut queue = VecDeque::new();
    for start in 0..w * h {
        if !on[start] || labels[start] != 0 {
            continue;
        }
        count += 1;
        labels[start] = count;
        queue.push_back(start);
        while let Some(i) = queue.pop_front() {
            let (x, y) = ((i % w) as isize, (i / w) as isize);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let j = ny as usize * w + nx as usize;
                    if on[j] && labels[j] == 0 {
                        labels[j] = count;
                        queue.push_back(j);
                    }
                }
            }
        }
    }
    Labels { width: w, height: h, labels, count }
}

/// Flood queue entry, lowest `(priority, age)` first
#[derive(Debug, Clone, Copy)]
struct FloodEntry {
    priority: f64,
    age: u64,
    index: usize,
}

impl PartialEq for FloodEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodEntry {}

impl PartialOrd for FloodEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed so that BinaryHeap pops the smallest entry
        other.priority.total_cmp(&self.priority).then_with(|| other.age.cmp(&self.age))
    }
}

/// Marker-controlled watershed on the negated distance, 4-connected and
/// confined to the foreground of `region`
pub fn watershed(distance: &FeatureMap, markers: &Labels, region: &Mask) -> Labels {
    let (w, h) = (distance.width, distance.height);
    let mut labels = vec![0u32; w * h];
    let mut heap = BinaryHeap::new();
    let mut age = 0u64;

    for (i, &m) in markers.labels.iter().enumerate() {
        if m != 0 && region.data[i] != 0 {
            labels[i] = m;
            heap.push(FloodEntry { priority: -distance.data[i], age, index: i });
            age += 1;
        }
    }

    while let Some(entry) = heap.pop() {
        let i = entry.index;
        let (x, y) = (i % w, i / w);
        let label = labels[i];
        let neighbours = [
            (y > 0).then(|| i - w),
            (x > 0).then(|| i - 1),
            (x + 1 < w).then(|| i + 1),
            (y + 1 < h).then(|| i + w),
        ];
        for j in neighbours.into_iter().flatten() {
            if labels[j] == 0 && region.data[j] != 0 {
                labels[j] = label;
                heap.push(FloodEntry { priority: -distance.data[j], age, index: j });
                age += 1;
            }
        }
    }

    Labels { width: w, height: h, labels, count: markers.count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Bright 7x7 squares on a dark 120x120 background
    fn five_squares() -> ColorImage {
        let corners = [(10, 10), (60, 12), (100, 15), (20, 80), (75, 90)];
        ColorImage::from_fn(120, 120, |x, y| {
            let inside = corners
                .iter()
                .any(|&(cx, cy)| x >= cx && x < cx + 7 && y >= cy && y < cy + 7);
            if inside { Rgb([230, 230, 230]) } else { Rgb([20, 20, 20]) }
        })
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        let k = gaussian_kernel(11, 2.0);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((k[0] - k[10]).abs() < 1e-15);
        assert!(k[5] > k[4]);
    }

    #[test]
    fn test_blur_preserves_flat_map() {
        let map = FeatureMap::from_fn(9, 7, |_, _| 77.0);
        let out = blur_5x5(&map);
        assert!(out.data.iter().all(|&v| v == 77.0));
    }

    #[test]
    fn test_adaptive_threshold_flat_is_background() {
        let map = FeatureMap::from_fn(20, 20, |_, _| 100.0);
        assert_eq!(adaptive_threshold(&map, 11, 2.0).count(), 0);
    }

    #[test]
    fn test_distance_to_background() {
        let mask = Mask::from_fn(9, 9, |x, y| (2..7).contains(&x) && (2..7).contains(&y));
        let d = distance_to_background(&mask);
        assert_eq!(d.get(0, 0), 0.0);
        assert_eq!(d.get(2, 2), 1.0);
        assert_eq!(d.get(4, 4), 3.0);
    }

    #[test]
    fn test_seed_plateau_is_one_marker() {
        let mut distance = FeatureMap::new(12, 12);
        distance.set(5, 5, 4.0);
        distance.set(6, 5, 4.0);
        distance.set(2, 2, 1.0);
        let markers = seed_markers(&distance);
        // (2, 2) is below 0.3 of the maximum
        assert_eq!(markers.count, 1);
        assert_eq!(markers.labels[5 * 12 + 5], markers.labels[5 * 12 + 6]);
    }

    #[test]
    fn test_watershed_splits_bridged_squares() {
        // two 9x9 squares joined by a one pixel bridge
        let mask = Mask::from_fn(26, 13, |x, y| {
            let left = (2..11).contains(&x) && (2..11).contains(&y);
            let right = (15..24).contains(&x) && (2..11).contains(&y);
            let bridge = (11..15).contains(&x) && y == 6;
            left || right || bridge
        });
        let distance = distance_to_background(&mask);
        assert_eq!(distance.get(6, 6), 5.0);
        let markers = seed_markers(&distance);
        assert_eq!(markers.count, 2);
        let labels = watershed(&distance, &markers, &mask);
        let labelled = labels.labels.iter().filter(|&&l| l > 0).count();
        assert_eq!(labelled, mask.count());
        assert_ne!(labels.labels[6 * 26 + 6], labels.labels[6 * 26 + 19]);
    }

    #[test]
    fn test_five_squares_detected() {
        let det = MorphologicalDetector.detect(&five_squares(), &AnalysisConfig::default()).unwrap();
        assert_eq!(det.stats.num_pills, 5);
        assert!(
            det.stats.avg_pill_area >= 36.0 && det.stats.avg_pill_area <= 64.0,
            "mean area {}",
            det.stats.avg_pill_area
        );
        assert_eq!(det.feature_map.max(), 255.0);
    }

    #[test]
    fn test_black_image_no_pills() {
        let det = MorphologicalDetector.detect(&ColorImage::new(40, 40), &AnalysisConfig::default()).unwrap();
        assert_eq!(det.mask.count(), 0);
        assert_eq!(det.stats.num_pills, 0);
    }
}
