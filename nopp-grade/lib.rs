//! Patch-PCA texture descriptors, severity grading (threshold policy or
//! statistical classifiers) and the grade-driven pill mask.

pub mod advanced;
pub mod detector;
pub mod dpca;
pub mod learn;
pub mod mask;
pub mod threshold;

pub use advanced::{advanced_descriptor, ADVANCED_FEATURES};
pub use detector::DpcaDetector;
pub use dpca::dpca_descriptor;
pub use learn::LearnerParams;
#[cfg(feature = "learning")]
pub use learn::{build_classifier, classify_learned, Classifier, LearnedGrade};
pub use mask::{dpca_feature_map, grade_mask, grade_percentile};
pub use threshold::{classify_by_threshold, descriptor_norm_std};

use nopp_core::{AnalysisConfig, ColorImage, Detection, NoppResult};
use nopp_detect::PillDetector;

/// Whether this build carries the statistical classifiers
pub fn learning_available() -> bool {
    cfg!(feature = "learning")
}

/// Grade and mask with the default training budget
pub fn detect_dpca(image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
    DpcaDetector::default().detect(image, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nopp_core::{ClassifierKind, PillingGrade};

    #[test]
    fn test_threshold_policy_without_backend_dependency() {
        let config = AnalysisConfig { classifier: ClassifierKind::Threshold, ..AnalysisConfig::default() };
        let det = detect_dpca(&ColorImage::new(32, 32), &config).unwrap();
        assert_eq!(det.stats.grading.unwrap().grade, PillingGrade::NONE);
    }

    #[test]
    fn test_scenario_norm_20_std_3() {
        assert_eq!(threshold::grade_for(20.0, 3.0), (PillingGrade::VERY_SEVERE, 0.85));
    }

    #[test]
    fn test_learning_flag_matches_feature() {
        assert_eq!(learning_available(), cfg!(feature = "learning"));
    }
}
