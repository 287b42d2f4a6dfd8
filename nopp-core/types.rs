use crate::config::ClassifierKind;
use crate::error::{NoppError, NoppResult};
use crate::Capability;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Colour input, channel order red, green, blue
pub type ColorImage = image::RgbImage;

/// Row-major scalar grid produced by every detector
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl FeatureMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![0.0; width * height] }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<f64>) -> NoppResult<Self> {
        if data.len() != width * height {
            return Err(NoppError::invalid_input(format!(
                "feature map data length mismatch: expected {}, got {}",
                width * height,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn from_fn<F: FnMut(usize, usize) -> f64>(width: usize, height: usize, mut f: F) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.data[y * self.width + x] = value;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replace NaN with 0 and infinities with the finite extremes of the map
    pub fn sanitize(&mut self) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &v in self.data.iter().filter(|v| v.is_finite()) {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if !lo.is_finite() {
            lo = 0.0;
            hi = 0.0;
        }
        for v in self.data.iter_mut() {
            if v.is_nan() {
                *v = 0.0;
            } else if *v == f64::INFINITY {
                *v = hi;
            } else if *v == f64::NEG_INFINITY {
                *v = lo;
            }
        }
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    pub fn max(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Population standard deviation
    pub fn std(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self.data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / self.data.len() as f64;
        var.sqrt()
    }
}

/// Binary pill map, 1 = pill pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![0; width * height] }
    }

    pub fn from_fn<F: FnMut(usize, usize) -> bool>(width: usize, height: usize, mut f: F) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y) as u8);
            }
        }
        Self { width, height, data }
    }

    /// Build from any byte buffer, non-zero bytes become 1
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> NoppResult<Self> {
        if data.len() != width * height {
            return Err(NoppError::invalid_input(format!(
                "mask data length mismatch: expected {}, got {}",
                width * height,
                data.len()
            )));
        }
        let data = data.into_iter().map(|v| (v != 0) as u8).collect();
        Ok(Self { width, height, data })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        self.data[y * self.width + x] = on as u8;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of set pixels
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn union(&self, other: &Mask) -> Mask {
        let data = self.data.iter().zip(&other.data).map(|(&a, &b)| ((a | b) != 0) as u8).collect();
        Mask { width: self.width, height: self.height, data }
    }

    pub fn same_shape(&self, other: &Mask) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Detection pipelines known to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Method {
    LbpVariance,
    Fourier,
    Morphological,
    Wavelet,
    Combined,
    Dpca,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::LbpVariance,
        Method::Fourier,
        Method::Morphological,
        Method::Wavelet,
        Method::Combined,
        Method::Dpca,
    ];

    /// Display name used in reports
    pub fn name(&self) -> &'static str {
        match self {
            Method::LbpVariance => "LBP + Variance",
            Method::Fourier => "Fourier + Gauss",
            Method::Morphological => "Morphological",
            Method::Wavelet => "Wavelet Transform",
            Method::Combined => "Combined",
            Method::Dpca => "DPCA + ML",
        }
    }

    /// Short identifier for command lines and config files
    pub fn key(&self) -> &'static str {
        match self {
            Method::LbpVariance => "lbp_variance",
            Method::Fourier => "fourier",
            Method::Morphological => "morphological",
            Method::Wavelet => "wavelet",
            Method::Combined => "combined",
            Method::Dpca => "dpca",
        }
    }

    /// Basic methods are always offered, the rest only in experimental mode
    pub fn is_basic(&self) -> bool {
        matches!(self, Method::LbpVariance | Method::Fourier | Method::Morphological)
    }

    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Method::Wavelet => Some(Capability::Wavelet),
            Method::Dpca => Some(Capability::Learning),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Method {
    type Err = NoppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "lbp_variance" | "lbp" => Ok(Method::LbpVariance),
            "fourier" | "fft" => Ok(Method::Fourier),
            "morphological" | "morph" | "watershed" => Ok(Method::Morphological),
            "wavelet" => Ok(Method::Wavelet),
            "combined" | "ensemble" => Ok(Method::Combined),
            "dpca" => Ok(Method::Dpca),
            _ => Err(NoppError::invalid_input(format!("unknown method '{}'", s))),
        }
    }
}

/// Standardized pilling grade, 1 = very severe, 5 = none
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct PillingGrade(u8);

impl PillingGrade {
    pub const VERY_SEVERE: PillingGrade = PillingGrade(1);
    pub const SEVERE: PillingGrade = PillingGrade(2);
    pub const MODERATE: PillingGrade = PillingGrade(3);
    pub const SLIGHT: PillingGrade = PillingGrade(4);
    pub const NONE: PillingGrade = PillingGrade(5);

    pub const ALL: [PillingGrade; 5] = [
        PillingGrade::VERY_SEVERE,
        PillingGrade::SEVERE,
        PillingGrade::MODERATE,
        PillingGrade::SLIGHT,
        PillingGrade::NONE,
    ];

    pub fn new(grade: u8) -> NoppResult<Self> {
        if (1..=5).contains(&grade) {
            Ok(PillingGrade(grade))
        } else {
            Err(NoppError::invalid_input(format!("pilling grade {} outside 1..=5", grade)))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Zero-based class index
    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }

    pub fn from_index(index: usize) -> NoppResult<Self> {
        Self::new(index as u8 + 1)
    }

    pub fn description(&self) -> &'static str {
        match self.0 {
            1 => "Very severe pilling",
            2 => "Severe pilling",
            3 => "Moderate pilling",
            4 => "Slight pilling",
            _ => "No pilling",
        }
    }
}

impl TryFrom<u8> for PillingGrade {
    type Error = NoppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PillingGrade::new(value)
    }
}

impl From<PillingGrade> for u8 {
    fn from(grade: PillingGrade) -> Self {
        grade.0
    }
}

impl std::fmt::Display for PillingGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

/// Pixel count one ensemble member contributed
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemberVotes {
    pub method: Method,
    pub pixels: usize,
}

/// Audit trail attached by the ensemble aggregator
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoteSummary {
    pub members: Vec<MemberVotes>,
    pub vote_threshold: usize,
    pub member_count: usize,
}

/// Severity classification attached by the patch-PCA detector
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GradeSummary {
    pub grade: PillingGrade,
    pub confidence: f64,
    pub description: String,
    pub classifier: ClassifierKind,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub cv_accuracy: Option<f64>,
    pub descriptor_len: usize,
}

/// Quantitative pilling measures for one mask
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stats {
    pub total_pixels: usize,
    pub nop_pixels: usize,
    pub nop_percentage: f64,
    pub num_pills: usize,
    pub avg_pill_area: f64,
    pub min_pill_area: f64,
    pub max_pill_area: f64,
    pub std_pill_area: f64,
    /// Pills per 10 000 pixels
    pub pill_density: f64,
    pub avg_circularity: f64,
    pub feature_mean: f64,
    pub feature_max: f64,
    pub feature_std: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub votes: Option<VoteSummary>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub grading: Option<GradeSummary>,
}

/// Output of every detector
#[derive(Debug, Clone)]
pub struct Detection {
    pub mask: Mask,
    pub feature_map: FeatureMap,
    pub stats: Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let mut map = FeatureMap::from_vec(2, 2, vec![f64::NAN, 3.0, f64::INFINITY, f64::NEG_INFINITY]).unwrap();
        map.sanitize();
        assert_eq!(map.data, vec![0.0, 3.0, 3.0, 3.0]);

        let map = FeatureMap::from_vec(1, 2, vec![f64::NAN, f64::INFINITY]).unwrap().sanitized();
        assert_eq!(map.data, vec![0.0, 0.0]);
    }

    #[test]
    fn test_feature_map_summary() {
        let map = FeatureMap::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(map.mean(), 2.5);
        assert_eq!(map.max(), 4.0);
        assert_eq!(map.min(), 1.0);
        assert!((map.std() - 1.25f64.sqrt()).abs() < 1e-12);
        assert!(FeatureMap::from_vec(3, 3, vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_mask_binarizes_and_counts() {
        let mask = Mask::from_vec(3, 1, vec![0, 7, 255]).unwrap();
        assert_eq!(mask.data, vec![0, 1, 1]);
        assert_eq!(mask.count(), 2);
        let other = Mask::from_vec(3, 1, vec![1, 0, 0]).unwrap();
        assert_eq!(mask.union(&other).count(), 3);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("lbp".parse::<Method>().unwrap(), Method::LbpVariance);
        assert_eq!("Wavelet".parse::<Method>().unwrap(), Method::Wavelet);
        assert_eq!("lbp-variance".parse::<Method>().unwrap(), Method::LbpVariance);
        assert!("hough".parse::<Method>().is_err());
        assert!(Method::Fourier.is_basic());
        assert!(!Method::Dpca.is_basic());
        assert_eq!(Method::Dpca.required_capability(), Some(Capability::Learning));
    }

    #[test]
    fn test_grade_descriptions() {
        assert_eq!(PillingGrade::VERY_SEVERE.description(), "Very severe pilling");
        assert_eq!(PillingGrade::MODERATE.description(), "Moderate pilling");
        assert_eq!(PillingGrade::NONE.description(), "No pilling");
        assert!(PillingGrade::new(0).is_err());
        assert!(PillingGrade::new(6).is_err());
        assert_eq!(PillingGrade::from_index(1).unwrap(), PillingGrade::SEVERE);
        assert_eq!(PillingGrade::SLIGHT.index(), 3);
    }
}
