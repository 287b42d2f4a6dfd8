use crate::config::{AnalysisConfig, ChannelWeights, ClassifierKind, LbpParams, WaveletFamily};
use crate::error::NoppResult;
use crate::types::Method;

/// Fluent construction of a validated `AnalysisConfig`
#[derive(Debug, Clone)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl Default for AnalysisConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self { config: AnalysisConfig::default() }
    }

    pub fn from_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn threshold_percentile(mut self, percentile: f64) -> Self {
        self.config.threshold_percentile = percentile;
        self
    }

    pub fn channel_weights(mut self, red: f64, green: f64, blue: f64) -> Self {
        self.config.channel_weights = ChannelWeights::new(red, green, blue);
        self
    }

    pub fn gauss_sigma(mut self, sigma: f64) -> Self {
        self.config.gauss_sigma = sigma;
        self
    }

    pub fn wavelet(mut self, family: WaveletFamily) -> Self {
        self.config.wavelet = family;
        self
    }

    pub fn patch_size(mut self, patch_size: usize) -> Self {
        self.config.patch_size = patch_size;
        self
    }

    pub fn sampling_step(mut self, step: usize) -> Self {
        self.config.sampling_step = step;
        self
    }

    pub fn resolution(mut self, cm_per_px: f64) -> Self {
        self.config.resolution_cm_per_px = cm_per_px;
        self
    }

    pub fn num_filters(mut self, n: usize) -> Self {
        self.config.num_filters = n;
        self
    }

    pub fn classifier(mut self, kind: ClassifierKind) -> Self {
        self.config.classifier = kind;
        self
    }

    pub fn cross_validation(mut self, enable: bool) -> Self {
        self.config.cross_validation = enable;
        self
    }

    pub fn extended_features(mut self, enable: bool) -> Self {
        self.config.extended_features = enable;
        self
    }

    pub fn samples_per_grade(mut self, n: usize) -> Self {
        self.config.samples_per_grade = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn min_pill_area(mut self, area: usize) -> Self {
        self.config.min_pill_area = area;
        self
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    pub fn lbp(mut self, radius: f64, points: usize) -> Self {
        self.config.lbp = LbpParams { radius, points };
        self
    }

    pub fn ensemble_members(mut self, members: &[Method]) -> Self {
        self.config.ensemble_members = Some(members.to_vec());
        self
    }

    /// Use the recommended patch size for the current resolution
    pub fn recommended_patch_size(mut self) -> Self {
        self.config.patch_size = crate::units::recommend_patch_size(self.config.resolution_cm_per_px);
        self
    }

    pub fn preset_fine_pills(self) -> Self {
        self.apply_preset(AnalysisConfig::fine_pills())
    }

    pub fn preset_coarse_pills(self) -> Self {
        self.apply_preset(AnalysisConfig::coarse_pills())
    }

    pub fn preset_research(self) -> Self {
        self.apply_preset(AnalysisConfig::research())
    }

    /// Presets keep the caller's resolution, seed and threads
    fn apply_preset(self, preset: AnalysisConfig) -> Self {
        let current = self.config;
        Self {
            config: AnalysisConfig {
                resolution_cm_per_px: current.resolution_cm_per_px,
                seed: current.seed,
                n_threads: current.n_threads,
                ..preset
            },
        }
    }

    pub fn summary(&self) -> String {
        self.config.summary()
    }

    pub fn build(self) -> NoppResult<AnalysisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluent_build() {
        let cfg = AnalysisConfigBuilder::new()
            .threshold_percentile(90.0)
            .channel_weights(1.0, 0.0, 0.0)
            .wavelet(WaveletFamily::Haar)
            .classifier(ClassifierKind::RandomForest)
            .samples_per_grade(20)
            .build()
            .unwrap();
        assert_eq!(cfg.threshold_percentile, 90.0);
        assert_eq!(cfg.channel_weights.red, 1.0);
        assert_eq!(cfg.wavelet, WaveletFamily::Haar);
        assert_eq!(cfg.samples_per_grade, 20);
    }

    #[test]
    fn test_build_rejects_invalid() {
        assert!(AnalysisConfigBuilder::new().patch_size(8).build().is_err());
        assert!(AnalysisConfigBuilder::new().gauss_sigma(0.0).build().is_err());
    }

    #[test]
    fn test_preset_keeps_resolution() {
        let cfg = AnalysisConfigBuilder::new().resolution(0.05).seed(7).preset_coarse_pills().build().unwrap();
        assert_eq!(cfg.resolution_cm_per_px, 0.05);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.patch_size, 9);
    }

    #[test]
    fn test_recommended_patch_size() {
        let cfg = AnalysisConfigBuilder::new().resolution(0.05).recommended_patch_size().build().unwrap();
        assert_eq!(cfg.patch_size, 9);
    }
}
