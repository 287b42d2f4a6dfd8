//! ReLU multilayer perceptron with a softmax output, trained by Adam on
//! shuffled mini-batches with an L2 penalty.

use nalgebra::{DMatrix, DVector};
use nopp_core::{NoppError, NoppResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::model::{check_training_set, Classifier};

const LEARNING_RATE: f64 = 1e-3;
const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
const L2_PENALTY: f64 = 1e-4;
const BATCH_SIZE: usize = 200;
/// Minimum loss improvement that resets the patience counter
const LOSS_TOLERANCE: f64 = 1e-4;
const PATIENCE: usize = 10;
/// Floor on predicted probabilities inside the log-loss
const PROB_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone)]
struct Layer {
    /// fan_in x fan_out
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl Layer {
    /// Glorot-uniform weights and biases
    fn glorot(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Self {
        let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let weights = DMatrix::from_fn(fan_in, fan_out, |_, _| rng.gen_range(-bound..bound));
        let bias = DVector::from_fn(fan_out, |_, _| rng.gen_range(-bound..bound));
        Self { weights, bias }
    }

    fn forward(&self, input: &DMatrix<f64>) -> DMatrix<f64> {
        let mut z = input * &self.weights;
        for (j, &b) in self.bias.iter().enumerate() {
            z.column_mut(j).add_scalar_mut(b);
        }
        z
    }
}

/// First and second moment estimates of one layer
#[derive(Debug, Clone)]
struct AdamState {
    m_w: DMatrix<f64>,
    v_w: DMatrix<f64>,
    m_b: DVector<f64>,
    v_b: DVector<f64>,
}

impl AdamState {
    fn for_layer(layer: &Layer) -> Self {
        let (r, c) = layer.weights.shape();
        Self {
            m_w: DMatrix::zeros(r, c),
            v_w: DMatrix::zeros(r, c),
            m_b: DVector::zeros(c),
            v_b: DVector::zeros(c),
        }
    }
}

fn adam_update(param: &mut [f64], grad: &[f64], m: &mut [f64], v: &mut [f64], step_size: f64) {
    for (((p, &g), m), v) in param.iter_mut().zip(grad).zip(m.iter_mut()).zip(v.iter_mut()) {
        *m = BETA1 * *m + (1.0 - BETA1) * g;
        *v = BETA2 * *v + (1.0 - BETA2) * g * g;
        *p -= step_size * *m / (v.sqrt() + ADAM_EPS);
    }
}

fn relu_in_place(z: &mut DMatrix<f64>) {
    z.apply(|v| *v = v.max(0.0));
}

fn softmax_rows(z: &mut DMatrix<f64>) {
    for mut row in z.row_iter_mut() {
        let max = row.max();
        row.apply(|v| *v = (*v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

#[derive(Debug, Clone)]
pub struct Mlp {
    hidden: Vec<usize>,
    max_epochs: usize,
    seed: u64,
    layers: Vec<Layer>,
    epochs_run: usize,
}

impl Mlp {
    pub fn new(hidden: Vec<usize>, max_epochs: usize, seed: u64) -> Self {
        Self { hidden, max_epochs, seed, layers: Vec::new(), epochs_run: 0 }
    }

    /// Epochs the last `fit` ran before converging or hitting the cap
    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    /// Activations of every layer, input first, softmax last
    fn forward_all(&self, input: DMatrix<f64>) -> Vec<DMatrix<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input);
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(&activations[l]);
            if l + 1 == self.layers.len() {
                softmax_rows(&mut z);
            } else {
                relu_in_place(&mut z);
            }
            activations.push(z);
        }
        activations
    }

    /// One Adam step on a batch, returns the penalised log-loss of the batch
    fn train_batch(
        &mut self,
        x: &DMatrix<f64>,
        targets: &[usize],
        state: &mut [AdamState],
        step: usize,
    ) -> f64 {
        let batch = targets.len() as f64;
        let activations = self.forward_all(x.clone());
        let output = &activations[activations.len() - 1];

        let mut loss = 0.0;
        let mut delta = output.clone();
        for (i, &t) in targets.iter().enumerate() {
            loss -= output[(i, t)].max(PROB_FLOOR).ln();
            delta[(i, t)] -= 1.0;
        }
        let penalty: f64 = self.layers.iter().map(|l| l.weights.norm_squared()).sum();
        loss = (loss + 0.5 * L2_PENALTY * penalty) / batch;

        let t = step as f64;
        let step_size = LEARNING_RATE * (1.0 - BETA2.powf(t)).sqrt() / (1.0 - BETA1.powf(t));

        for l in (0..self.layers.len()).rev() {
            let input = &activations[l];
            let mut grad_w = input.transpose() * &delta;
            grad_w += &self.layers[l].weights * L2_PENALTY;
            grad_w /= batch;
            let grad_b = DVector::from_iterator(delta.ncols(), delta.column_iter().map(|c| c.sum() / batch));

            if l > 0 {
                let mut back = &delta * self.layers[l].weights.transpose();
                back.zip_apply(input, |d, a| {
                    if a <= 0.0 {
                        *d = 0.0;
                    }
                });
                delta = back;
            }

            let layer = &mut self.layers[l];
            let s = &mut state[l];
            adam_update(
                layer.weights.as_mut_slice(),
                grad_w.as_slice(),
                s.m_w.as_mut_slice(),
                s.v_w.as_mut_slice(),
                step_size,
            );
            adam_update(layer.bias.as_mut_slice(), grad_b.as_slice(), s.m_b.as_mut_slice(), s.v_b.as_mut_slice(), step_size);
        }
        loss
    }
}

impl Classifier for Mlp {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[usize], n_classes: usize) -> NoppResult<()> {
        check_training_set(x, y, n_classes)?;
        if self.hidden.iter().any(|&h| h == 0) {
            return Err(NoppError::invalid_input("hidden layers need at least one unit"));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sizes = vec![x.ncols()];
        sizes.extend(&self.hidden);
        sizes.push(n_classes);
        self.layers = sizes.windows(2).map(|w| Layer::glorot(w[0], w[1], &mut rng)).collect();
        let mut state: Vec<AdamState> = self.layers.iter().map(AdamState::for_layer).collect();

        let n = x.nrows();
        let batch_size = BATCH_SIZE.min(n);
        let mut order: Vec<usize> = (0..n).collect();
        let mut best_loss = f64::INFINITY;
        let mut stalled = 0;
        let mut step = 0;
        self.epochs_run = 0;

        for _ in 0..self.max_epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for chunk in order.chunks(batch_size) {
                let xb = x.select_rows(chunk);
                let yb: Vec<usize> = chunk.iter().map(|&i| y[i]).collect();
                step += 1;
                epoch_loss += self.train_batch(&xb, &yb, &mut state, step) * chunk.len() as f64;
            }
            epoch_loss /= n as f64;
            self.epochs_run += 1;

            if !epoch_loss.is_finite() {
                return Err(NoppError::computation("network training diverged"));
            }
            if epoch_loss > best_loss - LOSS_TOLERANCE {
                stalled += 1;
            } else {
                stalled = 0;
            }
            best_loss = best_loss.min(epoch_loss);
            if stalled > PATIENCE {
                break;
            }
        }
        debug!(layers = ?self.hidden, epochs = self.epochs_run, loss = best_loss, "network trained");
        Ok(())
    }

    fn predict_proba(&self, sample: &[f64]) -> Option<Vec<f64>> {
        if self.layers.is_empty() {
            return None;
        }
        let input = DMatrix::from_row_slice(1, sample.len(), sample);
        let activations = self.forward_all(input);
        activations.last().map(|out| out.iter().copied().collect())
    }
}
