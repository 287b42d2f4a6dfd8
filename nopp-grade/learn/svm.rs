//! RBF support vector machine: one-vs-rest SMO machines with Platt-scaled
//! outputs normalised across classes.

use nalgebra::DMatrix;
use nopp_core::{NoppError, NoppResult};
use rayon::prelude::*;

use super::model::{argmax, check_training_set, Classifier};

/// Floor on the curvature of a working pair
const TAU: f64 = 1e-12;
const PLATT_MAX_ITER: usize = 100;
const PLATT_MIN_STEP: f64 = 1e-10;
const PLATT_SIGMA: f64 = 1e-12;
const PLATT_EPS: f64 = 1e-5;

#[derive(Debug, Clone)]
struct BinaryMachine {
    /// alpha_i * y_i for every training row
    coef: Vec<f64>,
    rho: f64,
    platt_a: f64,
    platt_b: f64,
}

impl BinaryMachine {
    fn decision(&self, kernel_row: &[f64]) -> f64 {
        self.coef.iter().zip(kernel_row).map(|(c, k)| c * k).sum::<f64>() - self.rho
    }

    fn probability(&self, decision: f64) -> f64 {
        sigmoid_probability(decision * self.platt_a + self.platt_b)
    }
}

#[derive(Debug, Clone)]
pub struct Svm {
    c: f64,
    tolerance: f64,
    gamma: f64,
    /// Training rows, one per kernel centre
    centres: Vec<Vec<f64>>,
    machines: Vec<BinaryMachine>,
}

impl Svm {
    pub fn new(c: f64, tolerance: f64) -> Self {
        Self { c, tolerance, gamma: 1.0, centres: Vec::new(), machines: Vec::new() }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
        (-self.gamma * d2).exp()
    }

    fn kernel_row(&self, sample: &[f64]) -> Vec<f64> {
        self.centres.iter().map(|c| self.kernel(c, sample)).collect()
    }

    /// Raw one-vs-rest decision values
    pub fn decision_function(&self, sample: &[f64]) -> Vec<f64> {
        let row = self.kernel_row(sample);
        self.machines.iter().map(|m| m.decision(&row)).collect()
    }
}

/// 1 / (n_features * Var(X)), 1 when X has no spread
fn scale_gamma(x: &DMatrix<f64>) -> f64 {
    let n = x.len() as f64;
    let mean = x.sum() / n;
    let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

/// Dual solution of one binary problem, maximal violating pair selection
fn smo(kernel: &[f64], y: &[f64], c: f64, tolerance: f64) -> (Vec<f64>, f64) {
    let n = y.len();
    let k = |i: usize, j: usize| kernel[i * n + j];
    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];
    let max_iter = (100 * n).max(100_000);

    for _ in 0..max_iter {
        let mut i = None;
        let mut g_max = f64::NEG_INFINITY;
        let mut j = None;
        let mut g_min = f64::INFINITY;
        for t in 0..n {
            let v = -y[t] * grad[t];
            let up = if y[t] > 0.0 { alpha[t] < c } else { alpha[t] > 0.0 };
            let low = if y[t] > 0.0 { alpha[t] > 0.0 } else { alpha[t] < c };
            if up && v >= g_max {
                g_max = v;
                i = Some(t);
            }
            if low && v <= g_min {
                g_min = v;
                j = Some(t);
            }
        }
        let (Some(i), Some(j)) = (i, j) else { break };
        if g_max - g_min < tolerance {
            break;
        }

        let curvature = (k(i, i) + k(j, j) - 2.0 * k(i, j)).max(TAU);
        let room_i = if y[i] > 0.0 { c - alpha[i] } else { alpha[i] };
        let room_j = if y[j] > 0.0 { alpha[j] } else { c - alpha[j] };
        let step = ((g_max - g_min) / curvature).min(room_i).min(room_j);

        alpha[i] = snap(alpha[i] + y[i] * step, c);
        alpha[j] = snap(alpha[j] - y[j] * step, c);
        for t in 0..n {
            grad[t] += y[t] * step * (k(t, i) - k(t, j));
        }
    }

    let rho = bias(&alpha, &grad, y, c);
    (alpha, rho)
}

/// Clamp round-off onto the box bounds
#[inline]
fn snap(v: f64, c: f64) -> f64 {
    let eps = 1e-12 * c.max(1.0);
    if v < eps {
        0.0
    } else if v > c - eps {
        c
    } else {
        v
    }
}

/// Offset from the free vectors, or the middle of the feasible interval
fn bias(alpha: &[f64], grad: &[f64], y: &[f64], c: f64) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut free = 0usize;
    let mut free_sum = 0.0;
    for t in 0..y.len() {
        let yg = y[t] * grad[t];
        if alpha[t] >= c {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            free += 1;
            free_sum += yg;
        }
    }
    if free > 0 {
        free_sum / free as f64
    } else if ub.is_finite() && lb.is_finite() {
        (ub + lb) / 2.0
    } else {
        0.0
    }
}

/// P(y = 1) = 1 / (1 + exp(fApB)), evaluated without overflow
#[inline]
fn sigmoid_probability(f_apb: f64) -> f64 {
    if f_apb >= 0.0 {
        let e = (-f_apb).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + f_apb.exp())
    }
}

/// Sigmoid fit of decision values (Newton with backtracking on regularised targets)
fn platt_scaling(decisions: &[f64], positive: &[bool]) -> (f64, f64) {
    let prior1 = positive.iter().filter(|&&p| p).count() as f64;
    let prior0 = positive.len() as f64 - prior1;
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = positive.iter().map(|&p| if p { hi } else { lo }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(&targets)
            .map(|(&f, &t)| {
                let f_apb = f * a + b;
                if f_apb >= 0.0 {
                    t * f_apb + (-f_apb).exp().ln_1p()
                } else {
                    (t - 1.0) * f_apb + f_apb.exp().ln_1p()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..PLATT_MAX_ITER {
        let (mut h11, mut h22, mut h21) = (PLATT_SIGMA, PLATT_SIGMA, 0.0);
        let (mut g1, mut g2) = (0.0, 0.0);
        for (&f, &t) in decisions.iter().zip(&targets) {
            let p = sigmoid_probability(f * a + b);
            let q = 1.0 - p;
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < PLATT_EPS && g2.abs() < PLATT_EPS {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= PLATT_MIN_STEP {
            let (na, nb) = (a + step * da, b + step * db);
            let candidate = objective(na, nb);
            if candidate < fval + 1e-4 * step * gd {
                a = na;
                b = nb;
                fval = candidate;
                break;
            }
            step /= 2.0;
        }
        if step < PLATT_MIN_STEP {
            break;
        }
    }
    (a, b)
}

impl Classifier for Svm {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[usize], n_classes: usize) -> NoppResult<()> {
        check_training_set(x, y, n_classes)?;
        if !(self.c > 0.0) {
            return Err(NoppError::invalid_input(format!("SVM box constraint {} must be positive", self.c)));
        }
        let n = x.nrows();
        self.gamma = scale_gamma(x);
        self.centres = x.row_iter().map(|r| r.iter().copied().collect()).collect();

        let mut kernel = vec![0.0; n * n];
        kernel.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
            for (j, v) in row.iter_mut().enumerate() {
                *v = self.kernel(&self.centres[i], &self.centres[j]);
            }
        });

        let (c, tolerance) = (self.c, self.tolerance);
        self.machines = (0..n_classes)
            .into_par_iter()
            .map(|class| {
                let signs: Vec<f64> = y.iter().map(|&label| if label == class { 1.0 } else { -1.0 }).collect();
                let (alpha, rho) = smo(&kernel, &signs, c, tolerance);
                let coef: Vec<f64> = alpha.iter().zip(&signs).map(|(a, s)| a * s).collect();
                let mut machine = BinaryMachine { coef, rho, platt_a: 0.0, platt_b: 0.0 };

                let decisions: Vec<f64> = (0..n).map(|i| machine.decision(&kernel[i * n..(i + 1) * n])).collect();
                let positive: Vec<bool> = y.iter().map(|&label| label == class).collect();
                let (a, b) = platt_scaling(&decisions, &positive);
                machine.platt_a = a;
                machine.platt_b = b;
                machine
            })
            .collect();
        Ok(())
    }

    fn predict_proba(&self, sample: &[f64]) -> Option<Vec<f64>> {
        if self.machines.is_empty() {
            return None;
        }
        let row = self.kernel_row(sample);
        let mut probs: Vec<f64> = self.machines.iter().map(|m| m.probability(m.decision(&row))).collect();
        let total: f64 = probs.iter().sum();
        if total > 0.0 {
            probs.iter_mut().for_each(|p| *p /= total);
        } else {
            let uniform = 1.0 / probs.len() as f64;
            probs.iter_mut().for_each(|p| *p = uniform);
        }
        Some(probs)
    }

    fn predict(&self, sample: &[f64]) -> usize {
        argmax(&self.decision_function(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::fixtures::clusters;

    #[test]
    fn test_separates_clusters() {
        let (x, y) = clusters(15);
        let mut svm = Svm::new(1.0, 1e-3);
        svm.fit(&x, &y, 3).unwrap();
        for (i, &label) in y.iter().enumerate() {
            let row: Vec<f64> = x.row(i).iter().copied().collect();
            assert_eq!(svm.predict(&row), label);
        }
        let probs = svm.predict_proba(&[3.0, -3.0]).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(argmax(&probs), 1);
    }

    #[test]
    fn test_scale_gamma() {
        let x = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 2.0, 2.0]);
        // variance of all entries is 1, two features
        assert!((scale_gamma(&x) - 0.5).abs() < 1e-12);
        assert_eq!(scale_gamma(&DMatrix::from_element(3, 2, 4.0)), 1.0);
    }

    #[test]
    fn test_smo_satisfies_equality_constraint() {
        let (x, labels) = clusters(8);
        let mut svm = Svm::new(1.0, 1e-3);
        svm.gamma = scale_gamma(&x);
        let rows: Vec<Vec<f64>> = x.row_iter().map(|r| r.iter().copied().collect()).collect();
        let n = rows.len();
        let mut kernel = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                kernel[i * n + j] = svm.kernel(&rows[i], &rows[j]);
            }
        }
        let y: Vec<f64> = labels.iter().map(|&l| if l == 0 { 1.0 } else { -1.0 }).collect();
        let (alpha, _) = smo(&kernel, &y, 1.0, 1e-3);
        let balance: f64 = alpha.iter().zip(&y).map(|(a, s)| a * s).sum();
        assert!(balance.abs() < 1e-9);
        assert!(alpha.iter().all(|&a| (0.0..=1.0).contains(&a)));
        assert!(alpha.iter().any(|&a| a > 0.0));
    }

    #[test]
    fn test_platt_orders_probabilities() {
        let decisions = [-2.0, -1.5, -1.0, -0.5, 0.5, 1.0, 1.5, 2.0];
        let positive = [false, false, false, true, false, true, true, true];
        let (a, b) = platt_scaling(&decisions, &positive);
        assert!(a < 0.0);
        assert!(sigmoid_probability(2.0 * a + b) > sigmoid_probability(-2.0 * a + b));
    }

    #[test]
    fn test_unfitted_has_no_probabilities() {
        assert!(Svm::new(1.0, 1e-3).predict_proba(&[0.0]).is_none());
    }
}
