use nalgebra::DMatrix;
use nopp_core::{NoppError, NoppResult};
use rayon::prelude::*;

use super::model::Classifier;

/// Soft voting: the mean of the members' class probabilities
pub struct SoftVoting {
    members: Vec<Box<dyn Classifier>>,
}

impl SoftVoting {
    pub fn new(members: Vec<Box<dyn Classifier>>) -> NoppResult<Self> {
        if members.is_empty() {
            return Err(NoppError::invalid_input("a voting ensemble needs at least one member"));
        }
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Classifier for SoftVoting {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[usize], n_classes: usize) -> NoppResult<()> {
        self.members.par_iter_mut().try_for_each(|member| member.fit(x, y, n_classes))
    }

    /// Members without probabilities abstain
    fn predict_proba(&self, sample: &[f64]) -> Option<Vec<f64>> {
        let mut votes = self.members.iter().filter_map(|m| m.predict_proba(sample));
        let mut sum = votes.next()?;
        let mut count = 1.0;
        for probs in votes {
            for (s, p) in sum.iter_mut().zip(&probs) {
                *s += p;
            }
            count += 1.0;
        }
        sum.iter_mut().for_each(|s| *s /= count);
        Some(sum)
    }
}
