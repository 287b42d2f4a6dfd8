//! Statistical grade classifiers trained on a synthetic set built around the
//! observed descriptor. Models are only compiled with the `learning` feature.

mod params;

pub use params::LearnerParams;

#[cfg(feature = "learning")]
pub mod forest;
#[cfg(feature = "learning")]
pub mod mlp;
#[cfg(feature = "learning")]
pub mod scaler;
#[cfg(feature = "learning")]
pub mod svm;
#[cfg(feature = "learning")]
pub mod synthetic;
#[cfg(feature = "learning")]
pub mod validation;
#[cfg(feature = "learning")]
pub mod voting;

#[cfg(all(test, feature = "learning"))]
pub(crate) mod fixtures;

#[cfg(feature = "learning")]
pub use model::{build_classifier, classify_learned, Classifier, LearnedGrade, DEFAULT_CONFIDENCE};

#[cfg(feature = "learning")]
mod model {
    use nalgebra::DMatrix;
    use nopp_core::{AnalysisConfig, ClassifierKind, NoppError, NoppResult, PillingGrade};
    use tracing::debug;

    use super::forest::RandomForest;
    use super::mlp::Mlp;
    use super::params::LearnerParams;
    use super::scaler::StandardScaler;
    use super::svm::Svm;
    use super::synthetic::synthetic_training_set;
    use super::validation::cross_val_accuracy;
    use super::voting::SoftVoting;

    /// Confidence reported when a model gives no class probabilities
    pub const DEFAULT_CONFIDENCE: f64 = 0.85;

    /// Hidden layers of the standard network
    const NETWORK_LAYERS: [usize; 2] = [100, 50];
    /// Hidden layers of the deep network
    const DEEP_NETWORK_LAYERS: [usize; 4] = [200, 100, 50, 25];

    /// A multi-class model over rows of `x`, classes `0..n_classes`
    pub trait Classifier: Send + Sync {
        fn fit(&mut self, x: &DMatrix<f64>, y: &[usize], n_classes: usize) -> NoppResult<()>;

        /// Class probabilities summing to 1, when the model has them
        fn predict_proba(&self, sample: &[f64]) -> Option<Vec<f64>>;

        fn predict(&self, sample: &[f64]) -> usize {
            self.predict_proba(sample).map(|p| argmax(&p)).unwrap_or(0)
        }
    }

    /// Index of the first largest value
    pub(crate) fn argmax(values: &[f64]) -> usize {
        let mut best = 0;
        for (i, &v) in values.iter().enumerate() {
            if v > values[best] {
                best = i;
            }
        }
        best
    }

    /// Shape and label checks shared by the models
    pub(crate) fn check_training_set(x: &DMatrix<f64>, y: &[usize], n_classes: usize) -> NoppResult<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(NoppError::invalid_input("training set is empty"));
        }
        if x.nrows() != y.len() {
            return Err(NoppError::invalid_input(format!(
                "{} training rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
            return Err(NoppError::invalid_input(format!("label {} outside {} classes", bad, n_classes)));
        }
        Ok(())
    }

    /// Untrained model of the given kind
    pub fn build_classifier(kind: ClassifierKind, params: &LearnerParams, seed: u64) -> NoppResult<Box<dyn Classifier>> {
        let network = |layers: &[usize], epochs: usize| Mlp::new(layers.to_vec(), epochs, seed);
        match kind {
            ClassifierKind::Threshold => Err(NoppError::invalid_input("the threshold policy has no trainable model")),
            ClassifierKind::Svm => Ok(Box::new(Svm::new(params.svm_c, params.svm_tolerance))),
            ClassifierKind::NeuralNetwork => Ok(Box::new(network(&NETWORK_LAYERS, params.mlp_epochs))),
            ClassifierKind::DeepNetwork => Ok(Box::new(network(&DEEP_NETWORK_LAYERS, params.mlp_epochs))),
            ClassifierKind::RandomForest => Ok(Box::new(RandomForest::new(params.forest_trees, seed))),
            ClassifierKind::Ensemble => Ok(Box::new(SoftVoting::new(vec![
                Box::new(Svm::new(params.svm_c, params.svm_tolerance)),
                Box::new(network(&NETWORK_LAYERS, params.ensemble_mlp_epochs)),
                Box::new(RandomForest::new(params.ensemble_forest_trees, seed)),
            ])?)),
        }
    }

    /// Outcome of a learned grading
    #[derive(Debug, Clone, PartialEq)]
    pub struct LearnedGrade {
        pub grade: PillingGrade,
        pub confidence: f64,
        pub cv_accuracy: Option<f64>,
    }

    /// Train `config.classifier` on synthetic samples around `descriptor` and grade it
    pub fn classify_learned(
        descriptor: &[f64],
        config: &AnalysisConfig,
        params: &LearnerParams,
    ) -> NoppResult<LearnedGrade> {
        let kind = config.classifier;
        if descriptor.is_empty() {
            return Err(NoppError::invalid_input("cannot grade an empty descriptor"));
        }
        let n_classes = PillingGrade::ALL.len();
        let set = synthetic_training_set(descriptor, config.samples_per_grade, config.seed)?;
        let scaler = StandardScaler::fit(&set.features);
        let x = scaler.transform(&set.features);

        let cv_accuracy = if config.cross_validation {
            let build = || build_classifier(kind, params, config.seed);
            Some(cross_val_accuracy(build, &x, &set.labels, n_classes, params.cv_folds)?)
        } else {
            None
        };

        let mut model = build_classifier(kind, params, config.seed)?;
        model.fit(&x, &set.labels, n_classes)?;

        let sample = scaler.transform_row(descriptor);
        let class = model.predict(&sample);
        let confidence = model
            .predict_proba(&sample)
            .map(|p| p.iter().copied().fold(0.0, f64::max))
            .unwrap_or(DEFAULT_CONFIDENCE);
        let grade = PillingGrade::from_index(class)?;

        debug!(classifier = kind.key(), grade = grade.value(), confidence, ?cv_accuracy, "learned grading");
        Ok(LearnedGrade { grade, confidence, cv_accuracy })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn test_config(kind: ClassifierKind) -> AnalysisConfig {
            AnalysisConfig { classifier: kind, samples_per_grade: 20, ..AnalysisConfig::default() }
        }

        fn descriptor() -> Vec<f64> {
            vec![4.0, -2.0, 1.5, 0.0, 8.0, 3.0, -0.5, 2.5]
        }

        #[test]
        fn test_argmax_prefers_first() {
            assert_eq!(argmax(&[0.2, 0.5, 0.5]), 1);
            assert_eq!(argmax(&[1.0]), 0);
        }

        #[test]
        fn test_threshold_has_no_model() {
            assert!(build_classifier(ClassifierKind::Threshold, &LearnerParams::fast(), 1).is_err());
            let err = classify_learned(&descriptor(), &test_config(ClassifierKind::Threshold), &LearnerParams::fast())
                .unwrap_err();
            assert_eq!(err.kind(), nopp_core::ErrorKind::InvalidInput);
        }

        #[test]
        fn test_every_learned_kind_grades() {
            let params = LearnerParams::fast();
            for kind in ClassifierKind::ALL.into_iter().filter(ClassifierKind::is_learned) {
                let result = classify_learned(&descriptor(), &test_config(kind), &params).unwrap();
                assert!((0.0..=1.0).contains(&result.confidence), "{}: {}", kind, result.confidence);
                assert!(result.confidence > 0.0);
                assert!(result.cv_accuracy.is_none());
            }
        }

        #[test]
        fn test_cross_validation_reported() {
            let config = AnalysisConfig { cross_validation: true, ..test_config(ClassifierKind::RandomForest) };
            let result = classify_learned(&descriptor(), &config, &LearnerParams::fast()).unwrap();
            let accuracy = result.cv_accuracy.unwrap();
            assert!((0.0..=1.0).contains(&accuracy));
        }

        #[test]
        fn test_same_seed_same_grade() {
            let config = test_config(ClassifierKind::RandomForest);
            let a = classify_learned(&descriptor(), &config, &LearnerParams::fast()).unwrap();
            let b = classify_learned(&descriptor(), &config, &LearnerParams::fast()).unwrap();
            assert_eq!(a, b);
        }

        #[test]
        fn test_check_training_set() {
            let x = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
            assert!(check_training_set(&x, &[0, 1], 2).is_ok());
            assert!(check_training_set(&x, &[0], 2).is_err());
            assert!(check_training_set(&x, &[0, 2], 2).is_err());
            assert!(check_training_set(&DMatrix::zeros(0, 3), &[], 2).is_err());
        }
    }
}
