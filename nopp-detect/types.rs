/// One 8-connected pill candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub label: u32,
    pub area: usize,
    pub perimeter: f64,
    /// (x, y) in pixels
    pub centroid: (f64, f64),
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl Region {
    pub(crate) fn empty(label: u32) -> Self {
        Self {
            label,
            area: 0,
            perimeter: 0.0,
            centroid: (0.0, 0.0),
            min_x: usize::MAX,
            min_y: usize::MAX,
            max_x: 0,
            max_y: 0,
        }
    }

    /// 4π·area / perimeter², undefined for a zero perimeter
    pub fn circularity(&self) -> Option<f64> {
        if self.perimeter > 0.0 {
            Some(4.0 * std::f64::consts::PI * self.area as f64 / (self.perimeter * self.perimeter))
        } else {
            None
        }
    }

    pub fn bbox_width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn bbox_height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    /// Radius of the disk with the same area
    pub fn equivalent_radius(&self) -> f64 {
        (self.area as f64 / std::f64::consts::PI).sqrt()
    }
}
