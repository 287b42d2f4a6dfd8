use nalgebra::{DMatrix, DVector, SymmetricEigen};
use nopp_core::{FeatureMap, NoppError, NoppResult};
use rayon::prelude::*;

/// Spacing of the patch grid in both directions
pub const PATCH_STRIDE: usize = 2;
/// Upper bound on second-stage components
pub const STAGE2_COMPONENTS: usize = 8;

/// Top-left corners of the patch grid along one axis
fn grid_positions(len: usize, patch: usize) -> Vec<usize> {
    if patch > len {
        return Vec::new();
    }
    (0..=len - patch).step_by(PATCH_STRIDE).collect()
}

/// Flattened patch minus its own mean
fn centred_patch(gray: &FeatureMap, x0: usize, y0: usize, patch: usize, out: &mut [f64]) {
    let mut k = 0;
    for y in y0..y0 + patch {
        let row = &gray.data[y * gray.width + x0..y * gray.width + x0 + patch];
        out[k..k + patch].copy_from_slice(row);
        k += patch;
    }
    let mean = out.iter().sum::<f64>() / out.len() as f64;
    out.iter_mut().for_each(|v| *v -= mean);
}

/// Principal axes of a covariance matrix as columns, strongest first.
/// Each axis is signed so that its largest-magnitude loading is positive.
pub fn principal_axes(cov: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
    let d = cov.nrows();
    let eig = SymmetricEigen::new(cov.clone());
    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let mut axes = DMatrix::zeros(d, k.min(d));
    for (c, &idx) in order.iter().take(k.min(d)).enumerate() {
        let mut axis: DVector<f64> = eig.eigenvectors.column(idx).clone_owned();
        let mut strongest = 0;
        for i in 1..d {
            if axis[i].abs() > axis[strongest].abs() {
                strongest = i;
            }
        }
        if axis[strongest] < 0.0 {
            axis.neg_mut();
        }
        axes.set_column(c, &axis);
    }
    axes
}

/// Running mean / covariance / projection moments over the patch grid
struct PatchScan<'a> {
    gray: &'a FeatureMap,
    patch: usize,
    xs: Vec<usize>,
    ys: Vec<usize>,
}

impl<'a> PatchScan<'a> {
    fn new(gray: &'a FeatureMap, patch: usize) -> Self {
        Self {
            gray,
            patch,
            xs: grid_positions(gray.width, patch),
            ys: grid_positions(gray.height, patch),
        }
    }

    fn count(&self) -> usize {
        self.xs.len() * self.ys.len()
    }

    fn dim(&self) -> usize {
        self.patch * self.patch
    }

    /// Fold every centred patch of a grid row into an accumulator, rows in parallel
    fn fold<A, F, R>(&self, init: impl Fn() -> A + Sync + Send, visit: F, merge: R) -> A
    where
        A: Send,
        F: Fn(&mut A, &[f64]) + Sync + Send,
        R: Fn(A, A) -> A + Sync + Send,
    {
        let dim = self.dim();
        self.ys
            .par_iter()
            .map(|&y| {
                let mut acc = init();
                let mut buffer = vec![0.0; dim];
                for &x in &self.xs {
                    centred_patch(self.gray, x, y, self.patch, &mut buffer);
                    visit(&mut acc, &buffer);
                }
                acc
            })
            .reduce(&init, &merge)
    }
}

/// Two-stage patch-PCA descriptor: per-component mean, std, max and min of
/// the second-stage projections, concatenated in that order.
///
/// An image smaller than one patch yields zeros of length
/// `4 * min(num_filters, STAGE2_COMPONENTS)`, the length a textured image
/// of the same settings gets, not `4 * num_filters`.
pub fn dpca_descriptor(gray: &FeatureMap, patch_size: usize, num_filters: usize) -> NoppResult<Vec<f64>> {
    if patch_size == 0 || num_filters == 0 {
        return Err(NoppError::invalid_input(format!(
            "patch size {} and filter count {} must be positive",
            patch_size, num_filters
        )));
    }
    let scan = PatchScan::new(gray, patch_size);
    let n = scan.count();
    if n == 0 {
        return Ok(vec![0.0; 4 * num_filters.min(STAGE2_COMPONENTS)]);
    }
    let dim = scan.dim();

    let sum = scan.fold(
        || vec![0.0f64; dim],
        |acc, patch| acc.iter_mut().zip(patch).for_each(|(a, v)| *a += v),
        |mut a, b| {
            a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
            a
        },
    );
    let mean = DVector::from_iterator(dim, sum.into_iter().map(|s| s / n as f64));

    let scatter = scan.fold(
        || DMatrix::<f64>::zeros(dim, dim),
        |acc, patch| {
            let v = DVector::from_iterator(dim, patch.iter().zip(mean.iter()).map(|(p, m)| p - m));
            acc.ger(1.0, &v, &v, 1.0);
        },
        |a, b| a + b,
    );
    let cov = scatter / (n.max(2) - 1) as f64;

    let k1 = num_filters.min(dim).min(n);
    let stage1 = principal_axes(&cov, k1);
    // stage-1 outputs have zero mean and covariance W1' C W1
    let stage1_cov = stage1.transpose() * &cov * &stage1;
    let k2 = STAGE2_COMPONENTS.min(k1).min(n);
    let stage2 = principal_axes(&stage1_cov, k2);
    let projection = &stage1 * &stage2;

    let moments = scan.fold(
        || ProjectionMoments::new(k2),
        |acc, patch| {
            let v = DVector::from_iterator(dim, patch.iter().zip(mean.iter()).map(|(p, m)| p - m));
            let z = projection.tr_mul(&v);
            acc.add(z.as_slice());
        },
        ProjectionMoments::merge,
    );

    Ok(moments.descriptor(n))
}

#[derive(Debug, Clone)]
struct ProjectionMoments {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    max: Vec<f64>,
    min: Vec<f64>,
}

impl ProjectionMoments {
    fn new(k: usize) -> Self {
        Self {
            sum: vec![0.0; k],
            sum_sq: vec![0.0; k],
            max: vec![f64::NEG_INFINITY; k],
            min: vec![f64::INFINITY; k],
        }
    }

    fn add(&mut self, z: &[f64]) {
        for (c, &v) in z.iter().enumerate() {
            self.sum[c] += v;
            self.sum_sq[c] += v * v;
            self.max[c] = self.max[c].max(v);
            self.min[c] = self.min[c].min(v);
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for c in 0..self.sum.len() {
            self.sum[c] += other.sum[c];
            self.sum_sq[c] += other.sum_sq[c];
            self.max[c] = self.max[c].max(other.max[c]);
            self.min[c] = self.min[c].min(other.min[c]);
        }
        self
    }

    fn descriptor(&self, n: usize) -> Vec<f64> {
        let n = n as f64;
        let means: Vec<f64> = self.sum.iter().map(|s| s / n).collect();
        let stds = self
            .sum_sq
            .iter()
            .zip(&means)
            .map(|(sq, m)| (sq / n - m * m).max(0.0).sqrt());
        means.iter().copied().chain(stds).chain(self.max.iter().copied()).chain(self.min.iter().copied()).collect()
    }
}
