use nalgebra::DMatrix;

/// Per-column standardisation to zero mean and unit variance
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Columns without spread keep scale 1
    pub fn fit(x: &DMatrix<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.column_iter() {
            let m = column.sum() / n;
            let var = column.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > 10.0 * f64::EPSILON * m.abs() { std } else { 1.0 });
        }
        Self { mean, scale }
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |r, c| (x[(r, c)] - self.mean[c]) / self.scale[c])
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardizes_columns() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 10.0, 2.0, 10.0, 3.0, 10.0, 4.0, 10.0]);
        let scaler = StandardScaler::fit(&x);
        assert_eq!(scaler.mean(), &[2.5, 10.0]);
        assert!((scaler.scale()[0] - 1.25f64.sqrt()).abs() < 1e-12);
        // constant column keeps unit scale
        assert_eq!(scaler.scale()[1], 1.0);

        let z = scaler.transform(&x);
        let column: Vec<f64> = z.column(0).iter().copied().collect();
        assert!(column.iter().sum::<f64>().abs() < 1e-12);
        assert!(z.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_row_matches_matrix() {
        let x = DMatrix::from_row_slice(3, 2, &[0.0, 1.0, 2.0, 5.0, 4.0, 9.0]);
        let scaler = StandardScaler::fit(&x);
        let z = scaler.transform(&x);
        let row = scaler.transform_row(&[2.0, 5.0]);
        assert!((row[0] - z[(1, 0)]).abs() < 1e-12);
        assert!((row[1] - z[(1, 1)]).abs() < 1e-12);
    }
}
