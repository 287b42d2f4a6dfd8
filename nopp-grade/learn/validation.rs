use nalgebra::DMatrix;
use nopp_core::{NoppError, NoppResult};
use rayon::prelude::*;

use super::model::Classifier;

/// Split row indices into `k` test folds keeping each class's share. Each
/// class is cut into `k` contiguous runs, the first runs one longer.
pub fn stratified_folds(labels: &[usize], n_classes: usize, k: usize) -> NoppResult<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(NoppError::invalid_input("cross-validation needs at least two folds"));
    }
    let mut folds = vec![Vec::new(); k];
    for class in 0..n_classes {
        let members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        if members.is_empty() {
            continue;
        }
        if members.len() < k {
            return Err(NoppError::invalid_input(format!(
                "class {} has {} samples, fewer than {} folds",
                class,
                members.len(),
                k
            )));
        }
        let base = members.len() / k;
        let extra = members.len() % k;
        let mut start = 0;
        for (f, fold) in folds.iter_mut().enumerate() {
            let len = base + usize::from(f < extra);
            fold.extend_from_slice(&members[start..start + len]);
            start += len;
        }
    }
    Ok(folds)
}

/// Mean held-out accuracy of fresh models from `build` over stratified folds
pub fn cross_val_accuracy<F>(build: F, x: &DMatrix<f64>, y: &[usize], n_classes: usize, k: usize) -> NoppResult<f64>
where
    F: Fn() -> NoppResult<Box<dyn Classifier>> + Sync,
{
    if x.nrows() != y.len() {
        return Err(NoppError::invalid_input("rows and labels differ in length"));
    }
    let folds = stratified_folds(y, n_classes, k)?;
    let scores = folds
        .par_iter()
        .map(|test| {
            let mut held_out = vec![false; y.len()];
            test.iter().for_each(|&i| held_out[i] = true);
            let train: Vec<usize> = (0..y.len()).filter(|&i| !held_out[i]).collect();

            let x_train = x.select_rows(&train);
            let y_train: Vec<usize> = train.iter().map(|&i| y[i]).collect();
            let mut model = build()?;
            model.fit(&x_train, &y_train, n_classes)?;

            let hits = test
                .iter()
                .filter(|&&i| {
                    let sample: Vec<f64> = x.row(i).iter().copied().collect();
                    model.predict(&sample) == y[i]
                })
                .count();
            Ok(hits as f64 / test.len().max(1) as f64)
        })
        .collect::<NoppResult<Vec<f64>>>()?;
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::fixtures::clusters;
    use crate::learn::forest::RandomForest;

    #[test]
    fn test_folds_are_stratified_and_disjoint() {
        let labels = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let folds = stratified_folds(&labels, 2, 2).unwrap();
        assert_eq!(folds[0], vec![0, 1, 2, 5, 6, 7]);
        assert_eq!(folds[1], vec![3, 4, 8, 9, 10]);
        let mut all: Vec<usize> = folds.concat();
        all.sort_unstable();
        assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_too_few_samples_per_class() {
        assert!(stratified_folds(&[0, 0, 1], 2, 2).is_err());
        assert!(stratified_folds(&[0, 0, 1, 1], 2, 1).is_err());
    }

    #[test]
    fn test_cross_validation_on_clusters() {
        let (x, y) = clusters(10);
        let build = || -> NoppResult<Box<dyn Classifier>> { Ok(Box::new(RandomForest::new(10, 3))) };
        let accuracy = cross_val_accuracy(build, &x, &y, 3, 5).unwrap();
        assert!(accuracy >= 0.9, "accuracy {}", accuracy);
    }
}
