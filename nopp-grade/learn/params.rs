/// Training budget of the learned classifiers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnerParams {
    /// SVM box constraint
    pub svm_c: f64,
    /// SMO stopping gap
    pub svm_tolerance: f64,
    pub mlp_epochs: usize,
    /// Epoch cap of the network inside the soft-voting ensemble
    pub ensemble_mlp_epochs: usize,
    pub forest_trees: usize,
    /// Tree count of the forest inside the soft-voting ensemble
    pub ensemble_forest_trees: usize,
    pub cv_folds: usize,
}

impl Default for LearnerParams {
    fn default() -> Self {
        Self {
            svm_c: 1.0,
            svm_tolerance: 1e-3,
            mlp_epochs: 1000,
            ensemble_mlp_epochs: 500,
            forest_trees: 100,
            ensemble_forest_trees: 50,
            cv_folds: 5,
        }
    }
}

impl LearnerParams {
    /// Small budget for previews and tests
    pub fn fast() -> Self {
        Self {
            mlp_epochs: 60,
            ensemble_mlp_epochs: 40,
            forest_trees: 15,
            ensemble_forest_trees: 10,
            ..Self::default()
        }
    }
}
