use nalgebra::DMatrix;

/// Three tight, well separated clusters in the plane, classes in order
pub(crate) fn clusters(per_class: usize) -> (DMatrix<f64>, Vec<usize>) {
    let centres = [(-3.0, -3.0), (3.0, -3.0), (0.0, 3.0)];
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for (class, &(cx, cy)) in centres.iter().enumerate() {
        for i in 0..per_class {
            let jitter = i as f64 / per_class as f64 - 0.5;
            rows.push(cx + 0.6 * jitter);
            rows.push(cy - 0.4 * jitter);
            labels.push(class);
        }
    }
    (DMatrix::from_row_slice(labels.len(), 2, &rows), labels)
}

pub(crate) fn row(x: &DMatrix<f64>, i: usize) -> Vec<f64> {
    x.row(i).iter().copied().collect()
}

/// Fraction of rows predicted correctly
pub(crate) fn training_accuracy(model: &dyn super::Classifier, x: &DMatrix<f64>, y: &[usize]) -> f64 {
    let hits = y.iter().enumerate().filter(|&(i, &label)| model.predict(&row(x, i)) == label).count();
    hits as f64 / y.len() as f64
}
