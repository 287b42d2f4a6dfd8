use nopp_core::{AnalysisConfig, ClassifierKind, ColorImage, Detection, GradeSummary, Method, NoppResult, PillingGrade};
use nopp_detect::{compute_stats, PillDetector, TexturePreprocessor};
use tracing::debug;

use crate::advanced::advanced_descriptor;
use crate::dpca::dpca_descriptor;
use crate::learn::LearnerParams;
use crate::mask::{dpca_feature_map, grade_mask};
use crate::threshold::classify_by_threshold;

/// Patch-PCA descriptor, severity grade, and a pill mask whose threshold
/// follows the grade
#[derive(Debug, Clone, Default)]
pub struct DpcaDetector {
    params: LearnerParams,
}

impl DpcaDetector {
    pub fn with_params(params: LearnerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LearnerParams {
        &self.params
    }
}

/// Grade, confidence and optional cross-validated accuracy for a descriptor
fn grade_descriptor(
    descriptor: &[f64],
    config: &AnalysisConfig,
    params: &LearnerParams,
) -> NoppResult<(PillingGrade, f64, Option<f64>)> {
    if config.classifier == ClassifierKind::Threshold {
        let (grade, confidence) = classify_by_threshold(descriptor);
        return Ok((grade, confidence, None));
    }
    learned_grade(descriptor, config, params)
}

#[cfg(feature = "learning")]
fn learned_grade(
    descriptor: &[f64],
    config: &AnalysisConfig,
    params: &LearnerParams,
) -> NoppResult<(PillingGrade, f64, Option<f64>)> {
    let learned = crate::learn::classify_learned(descriptor, config, params)?;
    Ok((learned.grade, learned.confidence, learned.cv_accuracy))
}

#[cfg(not(feature = "learning"))]
fn learned_grade(
    _descriptor: &[f64],
    _config: &AnalysisConfig,
    _params: &LearnerParams,
) -> NoppResult<(PillingGrade, f64, Option<f64>)> {
    Err(nopp_core::NoppError::MissingCapability(nopp_core::Capability::Learning))
}

impl PillDetector for DpcaDetector {
    fn method(&self) -> Method {
        Method::Dpca
    }

    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        config.validate()?;
        nopp_core::validate_image(image)?;
        let gray = TexturePreprocessor::to_gray(image);
        let gray_map = TexturePreprocessor::gray_map(&gray);

        let descriptor = if config.extended_features {
            advanced_descriptor(&gray)?
        } else {
            dpca_descriptor(&gray_map, config.patch_size, config.num_filters)?
        };
        let (grade, confidence, cv_accuracy) = grade_descriptor(&descriptor, config, &self.params)?;

        let feature_map = dpca_feature_map(&gray_map, config.patch_size, config.sampling_step)?;
        let mask = grade_mask(&feature_map, grade, config.min_pill_area)?;
        let mut stats = compute_stats(&mask, &feature_map)?;
        stats.grading = Some(GradeSummary {
            grade,
            confidence,
            description: grade.description().to_string(),
            classifier: config.classifier,
            cv_accuracy,
            descriptor_len: descriptor.len(),
        });

        debug!(
            grade = grade.value(),
            confidence,
            classifier = config.classifier.key(),
            pills = stats.num_pills,
            coverage = stats.nop_percentage,
            "dpca detection"
        );
        Ok(Detection { mask, feature_map, stats })
    }
}
