use crate::error::{NoppError, NoppResult};
use crate::types::Method;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative weight of each colour channel in the LBP-variance map
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelWeights {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl ChannelWeights {
    pub fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.red, self.green, self.blue]
    }

    /// Weights scaled to sum 1
    pub fn normalized(&self) -> NoppResult<[f64; 3]> {
        let w = self.as_array();
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(NoppError::invalid_input(format!(
                "channel weights must be finite and non-negative, got {:?}",
                w
            )));
        }
        let sum: f64 = w.iter().sum();
        if sum <= 0.0 {
            return Err(NoppError::invalid_input("channel weights sum to zero"));
        }
        Ok([w[0] / sum, w[1] / sum, w[2] / sum])
    }
}

impl Default for ChannelWeights {
    fn default() -> Self {
        Self { red: 0.2, green: 0.3, blue: 0.5 }
    }
}

/// Wavelet used by the energy detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WaveletFamily {
    #[cfg_attr(feature = "serde", serde(rename = "haar"))]
    Haar,
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "db4"))]
    Db4,
    #[cfg_attr(feature = "serde", serde(rename = "db8"))]
    Db8,
    #[cfg_attr(feature = "serde", serde(rename = "coif2"))]
    Coif2,
    #[cfg_attr(feature = "serde", serde(rename = "bior2.2"))]
    Bior22,
}

impl WaveletFamily {
    pub const ALL: [WaveletFamily; 5] = [
        WaveletFamily::Haar,
        WaveletFamily::Db4,
        WaveletFamily::Db8,
        WaveletFamily::Coif2,
        WaveletFamily::Bior22,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WaveletFamily::Haar => "haar",
            WaveletFamily::Db4 => "db4",
            WaveletFamily::Db8 => "db8",
            WaveletFamily::Coif2 => "coif2",
            WaveletFamily::Bior22 => "bior2.2",
        }
    }
}

impl std::fmt::Display for WaveletFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for WaveletFamily {
    type Err = NoppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WaveletFamily::ALL
            .iter()
            .copied()
            .find(|w| w.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| NoppError::invalid_input(format!("unknown wavelet family '{}'", s)))
    }
}

/// Policy mapping a texture descriptor to a pilling grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ClassifierKind {
    #[default]
    Threshold,
    Svm,
    NeuralNetwork,
    RandomForest,
    Ensemble,
    DeepNetwork,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 6] = [
        ClassifierKind::Threshold,
        ClassifierKind::Svm,
        ClassifierKind::NeuralNetwork,
        ClassifierKind::RandomForest,
        ClassifierKind::Ensemble,
        ClassifierKind::DeepNetwork,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::Threshold => "Threshold",
            ClassifierKind::Svm => "SVM",
            ClassifierKind::NeuralNetwork => "Neural Network",
            ClassifierKind::RandomForest => "Random Forest",
            ClassifierKind::Ensemble => "Ensemble",
            ClassifierKind::DeepNetwork => "Deep Network",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ClassifierKind::Threshold => "threshold",
            ClassifierKind::Svm => "svm",
            ClassifierKind::NeuralNetwork => "neural_network",
            ClassifierKind::RandomForest => "random_forest",
            ClassifierKind::Ensemble => "ensemble",
            ClassifierKind::DeepNetwork => "deep_network",
        }
    }

    /// Whether this kind trains a statistical model
    pub fn is_learned(&self) -> bool {
        !matches!(self, ClassifierKind::Threshold)
    }
}

impl std::fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ClassifierKind {
    type Err = NoppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        ClassifierKind::ALL
            .iter()
            .copied()
            .find(|k| k.key() == normalized)
            .ok_or_else(|| NoppError::invalid_input(format!("unknown classifier '{}'", s)))
    }
}

/// Local binary pattern sampling geometry
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LbpParams {
    pub radius: f64,
    pub points: usize,
}

impl Default for LbpParams {
    fn default() -> Self {
        Self { radius: 1.0, points: 8 }
    }
}

/// Every tunable of an analysis run. Immutable once handed to a detector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// Percentile (0-100) above which feature values count as pills
    pub threshold_percentile: f64,
    /// Low-pass width of the Fourier detector, in frequency bins
    pub gauss_sigma: f64,
    pub wavelet: WaveletFamily,
    /// Odd patch edge for the patch-PCA detector, 3..=19
    pub patch_size: usize,
    /// Stride of the grade-mask feature grid, 1..=10
    pub sampling_step: usize,
    /// Physical scale of one pixel
    pub resolution_cm_per_px: f64,
    /// Component cap of the first PCA stage
    pub num_filters: usize,
    pub classifier: ClassifierKind,
    pub cross_validation: bool,
    pub extended_features: bool,
    /// Synthetic training vectors generated per grade
    pub samples_per_grade: usize,
    pub seed: u64,
    /// Components smaller than this are dropped from the grade mask
    pub min_pill_area: usize,
    /// Worker threads for the pixel loops, 0 for one per core
    pub n_threads: usize,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub ensemble_members: Option<Vec<Method>>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub description: Option<String>,
    pub channel_weights: ChannelWeights,
    pub lbp: LbpParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: 85.0,
            gauss_sigma: 2.0,
            wavelet: WaveletFamily::Db4,
            patch_size: 5,
            sampling_step: 1,
            resolution_cm_per_px: 0.1,
            num_filters: 8,
            classifier: ClassifierKind::Threshold,
            cross_validation: false,
            extended_features: false,
            samples_per_grade: 200,
            seed: 42,
            min_pill_area: 20,
            n_threads: 0,
            ensemble_members: None,
            name: None,
            description: None,
            channel_weights: ChannelWeights::default(),
            lbp: LbpParams::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults of the interactive tool
    pub fn standard() -> Self {
        Self {
            name: Some("Standard".to_string()),
            description: Some("Balanced settings for typical knitwear photographs".to_string()),
            ..Self::default()
        }
    }

    /// Small pills on fine-gauge fabric
    pub fn fine_pills() -> Self {
        Self {
            threshold_percentile: 80.0,
            gauss_sigma: 1.5,
            wavelet: WaveletFamily::Haar,
            patch_size: 3,
            name: Some("Fine pills".to_string()),
            description: Some("Small pills, low threshold and short wavelet".to_string()),
            ..Self::default()
        }
    }

    /// Large pills on coarse fabric
    pub fn coarse_pills() -> Self {
        Self {
            threshold_percentile: 90.0,
            gauss_sigma: 3.0,
            wavelet: WaveletFamily::Db8,
            patch_size: 9,
            sampling_step: 2,
            min_pill_area: 40,
            name: Some("Coarse pills".to_string()),
            description: Some("Large pills, high threshold and wide patches".to_string()),
            ..Self::default()
        }
    }

    /// Learned ensemble on the 64-value descriptor with cross-validation
    pub fn research() -> Self {
        Self {
            classifier: ClassifierKind::Ensemble,
            cross_validation: true,
            extended_features: true,
            name: Some("Research".to_string()),
            description: Some("Extended descriptor, ensemble classifier, 5-fold validation".to_string()),
            ..Self::default()
        }
    }

    pub fn preset(name: &str) -> NoppResult<Self> {
        match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "standard" | "default" => Ok(Self::standard()),
            "fine_pills" | "fine" => Ok(Self::fine_pills()),
            "coarse_pills" | "coarse" => Ok(Self::coarse_pills()),
            "research" => Ok(Self::research()),
            other => Err(NoppError::invalid_input(format!("unknown preset '{}'", other))),
        }
    }

    pub fn with_metadata(mut self, name: &str, description: &str) -> Self {
        self.name = Some(name.to_string());
        self.description = Some(description.to_string());
        self
    }

    pub fn to_builder(self) -> crate::builder::AnalysisConfigBuilder {
        crate::builder::AnalysisConfigBuilder::from_config(self)
    }

    pub fn summary(&self) -> String {
        let w = self.channel_weights;
        format!(
            "AnalysisConfig: percentile={:.0}, weights=[R:{:.3}, G:{:.3}, B:{:.3}], sigma={:.1}, wavelet={}, patch={}x{} ({:.1} mm), step={}, filters={}, classifier={}, extended={}, cv={}",
            self.threshold_percentile,
            w.red,
            w.green,
            w.blue,
            self.gauss_sigma,
            self.wavelet,
            self.patch_size,
            self.patch_size,
            crate::units::patch_size_mm(self.patch_size, self.resolution_cm_per_px),
            self.sampling_step,
            self.num_filters,
            self.classifier,
            self.extended_features,
            self.cross_validation
        )
    }

    pub fn validate(&self) -> NoppResult<()> {
        if !self.threshold_percentile.is_finite() || !(0.0..=100.0).contains(&self.threshold_percentile) {
            return Err(NoppError::invalid_input(format!(
                "threshold percentile {} outside 0-100",
                self.threshold_percentile
            )));
        }
        self.channel_weights.normalized()?;
        if !self.gauss_sigma.is_finite() || self.gauss_sigma <= 0.0 {
            return Err(NoppError::invalid_input(format!("gauss sigma {} must be positive", self.gauss_sigma)));
        }
        if self.patch_size % 2 == 0 || !(3..=19).contains(&self.patch_size) {
            return Err(NoppError::invalid_input(format!(
                "patch size {} must be odd and within 3-19",
                self.patch_size
            )));
        }
        if !(1..=10).contains(&self.sampling_step) {
            return Err(NoppError::invalid_input(format!(
                "sampling step {} outside 1-10",
                self.sampling_step
            )));
        }
        if !self.resolution_cm_per_px.is_finite() || self.resolution_cm_per_px <= 0.0 {
            return Err(NoppError::invalid_input(format!(
                "resolution {} cm/px must be positive",
                self.resolution_cm_per_px
            )));
        }
        if self.num_filters == 0 {
            return Err(NoppError::invalid_input("at least one PCA filter is required"));
        }
        if self.samples_per_grade < 5 {
            return Err(NoppError::invalid_input(format!(
                "{} samples per grade is too few for training (minimum 5)",
                self.samples_per_grade
            )));
        }
        if !self.lbp.radius.is_finite() || self.lbp.radius <= 0.0 || !(1..=64).contains(&self.lbp.points) {
            return Err(NoppError::invalid_input(format!(
                "LBP geometry radius={} points={} is invalid",
                self.lbp.radius, self.lbp.points
            )));
        }
        if let Some(members) = &self.ensemble_members {
            if members.len() < 2 {
                return Err(NoppError::invalid_input("an ensemble needs at least two members"));
            }
            if members.contains(&Method::Combined) {
                return Err(NoppError::invalid_input("the combined method cannot vote in its own ensemble"));
            }
            for (i, m) in members.iter().enumerate() {
                if members[..i].contains(m) {
                    return Err(NoppError::invalid_input(format!("ensemble member '{}' listed twice", m.key())));
                }
            }
        }
        Ok(())
    }

    /// Save configuration to JSON file
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> NoppResult<()> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json)
            .map_err(|e| NoppError::computation(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }

    /// Load configuration from JSON file
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> NoppResult<Self> {
        let content = read_config_file(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Save configuration to TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> NoppResult<()> {
        let toml = self.to_toml()?;
        std::fs::write(path.as_ref(), toml)
            .map_err(|e| NoppError::computation(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }

    /// Load configuration from TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> NoppResult<Self> {
        let content = read_config_file(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load by file extension, `.json` or `.toml`
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> NoppResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "json" => Self::load_json(path),
            Some(ext) if ext == "toml" => Self::load_toml(path),
            _ => Err(NoppError::invalid_input(format!(
                "cannot infer config format of {} (expected .json or .toml)",
                path.display()
            ))),
        }
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> NoppResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| NoppError::computation(format!("JSON encoding failed: {}", e)))
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> NoppResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| NoppError::invalid_input(format!("malformed JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> NoppResult<String> {
        toml::to_string_pretty(self).map_err(|e| NoppError::computation(format!("TOML encoding failed: {}", e)))
    }

    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> NoppResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| NoppError::invalid_input(format!("malformed TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "serde")]
fn read_config_file(path: &std::path::Path) -> NoppResult<String> {
    std::fs::read_to_string(path).map_err(|e| NoppError::invalid_input(format!("cannot read {}: {}", path.display(), e)))
}
