use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use nopp_core::{FeatureMap, Mask, NoppError, NoppResult, Stats};

use crate::types::Region;

/// Per-pixel component labels, 0 = background
#[derive(Debug, Clone)]
pub struct Labels {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<u32>,
    pub count: u32,
}

/// 8-connected component labelling of a mask
pub fn label_components(mask: &Mask) -> Labels {
    if mask.is_empty() {
        return Labels { width: mask.width, height: mask.height, labels: Vec::new(), count: 0 };
    }
    let image = GrayImage::from_fn(mask.width as u32, mask.height as u32, |x, y| {
        Luma([mask.data[y as usize * mask.width + x as usize]])
    });
    let labelled = connected_components(&image, Connectivity::Eight, Luma([0u8]));
    let labels: Vec<u32> = labelled.into_raw();
    let count = labels.iter().copied().max().unwrap_or(0);
    Labels { width: mask.width, height: mask.height, labels, count }
}

/// Area, perimeter, centroid and bounding box of every component
pub fn regions(mask: &Mask) -> Vec<Region> {
    let labels = label_components(mask);
    regions_from_labels(&labels)
}

pub fn regions_from_labels(labels: &Labels) -> Vec<Region> {
    let n = labels.count as usize;
    let mut regions: Vec<Region> = (1..=labels.count).map(Region::empty).collect();
    let mut sum_x = vec![0.0f64; n];
    let mut sum_y = vec![0.0f64; n];

    for y in 0..labels.height {
        for x in 0..labels.width {
            let l = labels.labels[y * labels.width + x];
            if l == 0 {
                continue;
            }
            let i = l as usize - 1;
            let region = &mut regions[i];
            region.area += 1;
            region.min_x = region.min_x.min(x);
            region.min_y = region.min_y.min(y);
            region.max_x = region.max_x.max(x);
            region.max_y = region.max_y.max(y);
            sum_x[i] += x as f64;
            sum_y[i] += y as f64;
        }
    }

    for (i, region) in regions.iter_mut().enumerate() {
        if region.area > 0 {
            region.centroid = (sum_x[i] / region.area as f64, sum_y[i] / region.area as f64);
            region.perimeter = region_perimeter(labels, region);
        }
    }
    regions.retain(|r| r.area > 0);
    regions
}

/// Boundary length estimate of one labelled component.
///
/// Boundary pixels are those removed by a 4-neighbour erosion. Each is weighted
/// by its neighbourhood code `1 + 2 * (edge neighbours on the boundary) +
/// 10 * (corner neighbours on the boundary)`: straight runs count 1, diagonal
/// steps sqrt(2), corners (1 + sqrt(2)) / 2.
fn region_perimeter(labels: &Labels, region: &Region) -> f64 {
    // local copy padded by one pixel so that everything outside reads 0
    let bw = region.max_x - region.min_x + 3;
    let bh = region.max_y - region.min_y + 3;
    let mut local = vec![0u8; bw * bh];
    for y in region.min_y..=region.max_y {
        for x in region.min_x..=region.max_x {
            if labels.labels[y * labels.width + x] == region.label {
                local[(y - region.min_y + 1) * bw + (x - region.min_x + 1)] = 1;
            }
        }
    }

    let at = |img: &[u8], x: usize, y: usize| img[y * bw + x];
    let mut border = vec![0u8; bw * bh];
    for y in 1..bh - 1 {
        for x in 1..bw - 1 {
            if at(&local, x, y) == 0 {
                continue;
            }
            let interior = at(&local, x - 1, y) != 0
                && at(&local, x + 1, y) != 0
                && at(&local, x, y - 1) != 0
                && at(&local, x, y + 1) != 0;
            if !interior {
                border[y * bw + x] = 1;
            }
        }
    }

    let straight = 1.0;
    let diagonal = std::f64::consts::SQRT_2;
    let corner = (1.0 + std::f64::consts::SQRT_2) / 2.0;

    let mut total = 0.0;
    for y in 1..bh - 1 {
        for x in 1..bw - 1 {
            if at(&border, x, y) == 0 {
                continue;
            }
            let edges = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                .iter()
                .filter(|&&(nx, ny)| at(&border, nx, ny) != 0)
                .count();
            let corners = [(x - 1, y - 1), (x + 1, y - 1), (x - 1, y + 1), (x + 1, y + 1)]
                .iter()
                .filter(|&&(nx, ny)| at(&border, nx, ny) != 0)
                .count();
            let code = 1 + 2 * edges + 10 * corners;
            total += match code {
                5 | 7 | 15 | 17 | 25 | 27 => straight,
                21 | 33 => diagonal,
                13 | 23 => corner,
                _ => 0.0,
            };
        }
    }
    total
}

/// Drop components with fewer than `min_area` pixels
pub fn remove_small_components(mask: &Mask, min_area: usize) -> Mask {
    let labels = label_components(mask);
    let mut areas = vec![0usize; labels.count as usize + 1];
    for &l in &labels.labels {
        areas[l as usize] += 1;
    }
    let data = labels
        .labels
        .iter()
        .map(|&l| (l != 0 && areas[l as usize] >= min_area) as u8)
        .collect();
    Mask { width: mask.width, height: mask.height, data }
}

/// Quantitative pilling measures of a mask and the feature map it came from
pub fn compute_stats(mask: &Mask, feature_map: &FeatureMap) -> NoppResult<Stats> {
    if mask.width != feature_map.width || mask.height != feature_map.height {
        return Err(NoppError::invalid_input(format!(
            "mask {}x{} does not match feature map {}x{}",
            mask.width, mask.height, feature_map.width, feature_map.height
        )));
    }
    let total_pixels = mask.len();
    if total_pixels == 0 {
        return Err(NoppError::invalid_input("cannot compute statistics of an empty mask"));
    }

    let nop_pixels = mask.count();
    let nop_percentage = nop_pixels as f64 / total_pixels as f64 * 100.0;

    let regions = regions(mask);
    let num_pills = regions.len();

    let mut stats = Stats {
        total_pixels,
        nop_pixels,
        nop_percentage,
        num_pills,
        feature_mean: feature_map.mean(),
        feature_max: feature_map.max(),
        feature_std: feature_map.std(),
        ..Stats::default()
    };

    if num_pills > 0 {
        let areas: Vec<f64> = regions.iter().map(|r| r.area as f64).collect();
        let (mean, std) = crate::utils::mean_std(&areas);
        stats.avg_pill_area = mean;
        stats.std_pill_area = std;
        stats.min_pill_area = areas.iter().copied().fold(f64::INFINITY, f64::min);
        stats.max_pill_area = areas.iter().copied().fold(0.0, f64::max);
        stats.pill_density = num_pills as f64 / (total_pixels as f64 / 10_000.0);

        let circularities: Vec<f64> = regions.iter().filter_map(Region::circularity).collect();
        if !circularities.is_empty() {
            stats.avg_circularity = circularities.iter().sum::<f64>() / circularities.len() as f64;
        }
    }

    Ok(stats)
}
