use nopp_core::{FeatureMap, Mask};
use rayon::prelude::*;

/// Flat structuring element anchored at its centre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    pub width: usize,
    pub height: usize,
    offsets: Vec<(isize, isize)>,
}

impl StructuringElement {
    /// Filled ellipse inscribed in a `width x height` box
    pub fn ellipse(width: usize, height: usize) -> Self {
        let r = (height / 2) as isize;
        let c = (width / 2) as isize;
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
        let mut offsets = Vec::new();
        for i in 0..height as isize {
            let dy = i - r;
            let (j1, j2) = if dy.abs() <= r {
                let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize;
                ((c - dx).max(0), (c + dx + 1).min(width as isize))
            } else {
                (0, 0)
            };
            for j in j1..j2 {
                offsets.push((j - c, dy));
            }
        }
        Self { width, height, offsets }
    }

    /// Full rectangle
    pub fn rect(width: usize, height: usize) -> Self {
        let c = (width / 2) as isize;
        let r = (height / 2) as isize;
        let mut offsets = Vec::with_capacity(width * height);
        for i in 0..height as isize {
            for j in 0..width as isize {
                offsets.push((j - c, i - r));
            }
        }
        Self { width, height, offsets }
    }

    /// 3x3 cross (4-neighbourhood plus centre)
    pub fn cross() -> Self {
        Self { width: 3, height: 3, offsets: vec![(0, -1), (-1, 0), (0, 0), (1, 0), (0, 1)] }
    }

    /// (dx, dy) offsets covered by the element
    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Binary and grayscale morphology. Samples outside the image are ignored.
pub struct Morphology;

impl Morphology {
    pub fn erode(mask: &Mask, se: &StructuringElement) -> Mask {
        Self::binary_filter(mask, se, true)
    }

    pub fn dilate(mask: &Mask, se: &StructuringElement) -> Mask {
        Self::binary_filter(mask, se, false)
    }

    pub fn open(mask: &Mask, se: &StructuringElement) -> Mask {
        Self::dilate(&Self::erode(mask, se), se)
    }

    pub fn close(mask: &Mask, se: &StructuringElement) -> Mask {
        Self::erode(&Self::dilate(mask, se), se)
    }

    fn binary_filter(mask: &Mask, se: &StructuringElement, erode: bool) -> Mask {
        let (w, h) = (mask.width, mask.height);
        let data: Vec<u8> = (0..h)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..w).map(move |x| {
                    let mut inside = se.offsets().iter().filter_map(|&(dx, dy)| {
                        let nx = x as isize + dx;
                        let ny = y as isize + dy;
                        if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                            None
                        } else {
                            Some(mask.data[ny as usize * w + nx as usize] != 0)
                        }
                    });
                    let hit = if erode { inside.all(|v| v) } else { inside.any(|v| v) };
                    hit as u8
                })
            })
            .collect();
        Mask { width: w, height: h, data }
    }

    pub fn grey_erode(map: &FeatureMap, se: &StructuringElement) -> FeatureMap {
        Self::grey_filter(map, se, f64::INFINITY, f64::min)
    }

    pub fn grey_dilate(map: &FeatureMap, se: &StructuringElement) -> FeatureMap {
        Self::grey_filter(map, se, f64::NEG_INFINITY, f64::max)
    }

    pub fn grey_open(map: &FeatureMap, se: &StructuringElement) -> FeatureMap {
        Self::grey_dilate(&Self::grey_erode(map, se), se)
    }

    pub fn grey_close(map: &FeatureMap, se: &StructuringElement) -> FeatureMap {
        Self::grey_erode(&Self::grey_dilate(map, se), se)
    }

    /// Bright details smaller than the element
    pub fn top_hat(map: &FeatureMap, se: &StructuringElement) -> FeatureMap {
        let opened = Self::grey_open(map, se);
        let data = map.data.iter().zip(&opened.data).map(|(v, o)| v - o).collect();
        FeatureMap { width: map.width, height: map.height, data }
    }

    /// Dark details smaller than the element
    pub fn black_hat(map: &FeatureMap, se: &StructuringElement) -> FeatureMap {
        let closed = Self::grey_close(map, se);
        let data = map.data.iter().zip(&closed.data).map(|(v, c)| c - v).collect();
        FeatureMap { width: map.width, height: map.height, data }
    }

    fn grey_filter(map: &FeatureMap, se: &StructuringElement, init: f64, op: fn(f64, f64) -> f64) -> FeatureMap {
        let (w, h) = (map.width, map.height);
        let data: Vec<f64> = (0..h)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..w).map(move |x| {
                    let mut acc = init;
                    for &(dx, dy) in se.offsets() {
                        let nx = x as isize + dx;
                        let ny = y as isize + dy;
                        if nx >= 0 && ny >= 0 && nx < w as isize && ny < h as isize {
                            acc = op(acc, map.data[ny as usize * w + nx as usize]);
                        }
                    }
                    if acc.is_finite() { acc } else { map.data[y * w + x] }
                })
            })
            .collect();
        FeatureMap { width: w, height: h, data }
    }
}
