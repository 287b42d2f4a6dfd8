use std::collections::BTreeMap;

use nopp_core::{AnalysisConfig, Capabilities, ColorImage, Detection, Method, NoppError, NoppResult};
use nopp_detect::{pixel_detector, EnsembleDetector, PillDetector};
use nopp_grade::{DpcaDetector, LearnerParams};
use tracing::{debug, warn};

use crate::report::ComparisonReport;

/// Which optional backends this build carries
pub fn probe_capabilities() -> Capabilities {
    Capabilities::new(nopp_detect::wavelet_available(), nopp_grade::learning_available())
}

/// The detection methods on offer, with backend availability fixed at construction
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    capabilities: Capabilities,
    experimental: bool,
    learner: LearnerParams,
}

impl MethodRegistry {
    /// Probe the build once; `experimental` also offers Wavelet, Combined and DPCA
    pub fn new(experimental: bool) -> Self {
        Self::with_capabilities(probe_capabilities(), experimental)
    }

    pub fn with_capabilities(capabilities: Capabilities, experimental: bool) -> Self {
        Self { capabilities, experimental, learner: LearnerParams::default() }
    }

    /// Training budget handed to the DPCA detector
    pub fn with_learner(mut self, learner: LearnerParams) -> Self {
        self.learner = learner;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn experimental(&self) -> bool {
        self.experimental
    }

    /// Methods a comparison runs, in report order
    pub fn available(&self) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|m| m.is_basic() || self.experimental)
            .filter(|m| self.capabilities.supports(*m))
            .collect()
    }

    /// Run one method. Fails with `MissingCapability` when its backend is absent.
    pub fn run(&self, method: Method, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        if let Some(cap) = method.required_capability() {
            if !self.capabilities.has(cap) {
                return Err(NoppError::MissingCapability(cap));
            }
        }
        match method {
            Method::Combined => EnsembleDetector::for_config(config)?.detect(image, config),
            Method::Dpca => DpcaDetector::with_params(self.learner).detect(image, config),
            other => pixel_detector(other)?.detect(image, config),
        }
    }

    /// Every available method on the same image. A failing method is
    /// logged and listed, the others still run.
    pub fn compare(&self, image: &ColorImage, config: &AnalysisConfig) -> ComparisonReport {
        let mut results = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for method in self.available() {
            match self.run(method, image, config) {
                Ok(detection) => {
                    debug!(method = method.key(), pills = detection.stats.num_pills, "method finished");
                    results.insert(method, detection);
                }
                Err(err) => {
                    warn!(method = method.key(), error = %err, "method failed during comparison");
                    failures.insert(method, err);
                }
            }
        }
        ComparisonReport { results, failures }
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}
