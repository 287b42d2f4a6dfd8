//! Bagged Gini decision trees grown to purity, probabilities averaged over trees.

use nalgebra::DMatrix;
use nopp_core::{NoppError, NoppResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::model::{check_training_set, Classifier};

/// Distinct feature values closer than this are not split apart
const SPLIT_EPS: f64 = 1e-7;

#[derive(Debug, Clone)]
enum Node {
    Leaf { distribution: Vec<f64> },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn distribution(&self, sample: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
                Node::Split { feature, threshold, left, right } => {
                    index = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Best split found for a node
struct SplitChoice {
    feature: usize,
    threshold: f64,
    score: f64,
}

struct TreeBuilder<'a> {
    x: &'a DMatrix<f64>,
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn class_counts(&self, indices: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += 1.0;
        }
        counts
    }

    /// Highest sum over both sides of (class count)^2 / side size, which
    /// minimises the weighted Gini impurity
    fn best_split_on(&self, indices: &[usize], feature: usize, total: &[f64]) -> Option<SplitChoice> {
        let mut values: Vec<(f64, usize)> = indices.iter().map(|&i| (self.x[(i, feature)], self.y[i])).collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = values.len() as f64;
        let mut left = vec![0.0; self.n_classes];
        let mut best: Option<SplitChoice> = None;
        for p in 1..values.len() {
            left[values[p - 1].1] += 1.0;
            if values[p].0 <= values[p - 1].0 + SPLIT_EPS {
                continue;
            }
            let n_left = p as f64;
            let n_right = n - n_left;
            let mut score = 0.0;
            for (l, t) in left.iter().zip(total) {
                let r = t - l;
                score += l * l / n_left + r * r / n_right;
            }
            if best.as_ref().map_or(true, |b| score > b.score) {
                let threshold = 0.5 * (values[p - 1].0 + values[p].0);
                best = Some(SplitChoice { feature, threshold, score });
            }
        }
        best
    }

    /// Examine at least `max_features` random features, more while none can split
    fn choose_split(&mut self, indices: &[usize], total: &[f64]) -> Option<SplitChoice> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut self.rng);
        let mut best: Option<SplitChoice> = None;
        for (examined, &feature) in features.iter().enumerate() {
            if examined >= self.max_features && best.is_some() {
                break;
            }
            if let Some(choice) = self.best_split_on(indices, feature, total) {
                if best.as_ref().map_or(true, |b| choice.score > b.score) {
                    best = Some(choice);
                }
            }
        }
        best
    }

    fn grow(&mut self, indices: &[usize]) -> usize {
        let counts = self.class_counts(indices);
        let slot = self.nodes.len();
        let pure = counts.iter().filter(|&&c| c > 0.0).count() <= 1;

        let split = if pure || indices.len() < 2 { None } else { self.choose_split(indices, &counts) };
        let Some(split) = split else {
            let total = indices.len().max(1) as f64;
            self.nodes.push(Node::Leaf { distribution: counts.iter().map(|c| c / total).collect() });
            return slot;
        };

        self.nodes.push(Node::Split { feature: split.feature, threshold: split.threshold, left: 0, right: 0 });
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| self.x[(i, split.feature)] <= split.threshold);
        let left_slot = self.grow(&left);
        let right_slot = self.grow(&right);
        self.nodes[slot] = Node::Split { feature: split.feature, threshold: split.threshold, left: left_slot, right: right_slot };
        slot
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    n_trees: usize,
    seed: u64,
    n_classes: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self { n_trees, seed, n_classes: 0, trees: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

/// Independent stream per tree
fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed.wrapping_add((tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[usize], n_classes: usize) -> NoppResult<()> {
        check_training_set(x, y, n_classes)?;
        if self.n_trees == 0 {
            return Err(NoppError::invalid_input("a forest needs at least one tree"));
        }
        let n = x.nrows();
        let max_features = ((x.ncols() as f64).sqrt() as usize).max(1);
        self.n_classes = n_classes;
        self.trees = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(self.seed, t));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder { x, y, n_classes, max_features, rng, nodes: Vec::new() };
                builder.grow(&sample);
                Tree { nodes: builder.nodes }
            })
            .collect();
        Ok(())
    }

    fn predict_proba(&self, sample: &[f64]) -> Option<Vec<f64>> {
        if self.trees.is_empty() {
            return None;
        }
        let mut probs = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, d) in probs.iter_mut().zip(tree.distribution(sample)) {
                *p += d;
            }
        }
        let n = self.trees.len() as f64;
        probs.iter_mut().for_each(|p| *p /= n);
        Some(probs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::fixtures::{clusters, training_accuracy};

    #[test]
    fn test_fits_clusters() {
        let (x, y) = clusters(20);
        let mut forest = RandomForest::new(25, 42);
        forest.fit(&x, &y, 3).unwrap();
        assert_eq!(forest.len(), 25);
        assert!(training_accuracy(&forest, &x, &y) >= 0.95);
        let probs = forest.predict_proba(&[3.0, -3.0]).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[1] > 0.5);
    }

    #[test]
    fn test_single_tree_grows_to_purity() {
        let x = DMatrix::from_row_slice(6, 1, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = [0, 0, 1, 1, 0, 0];
        let mut builder = TreeBuilder {
            x: &x,
            y: &y,
            n_classes: 2,
            max_features: 1,
            rng: StdRng::seed_from_u64(1),
            nodes: Vec::new(),
        };
        builder.grow(&[0, 1, 2, 3, 4, 5]);
        let tree = Tree { nodes: builder.nodes };
        for (i, &label) in y.iter().enumerate() {
            let d = tree.distribution(&[i as f64]);
            assert_eq!(d[label], 1.0);
        }
    }

    #[test]
    fn test_constant_features_give_prior_leaf() {
        let x = DMatrix::from_element(4, 2, 1.0);
        let y = [0, 1, 1, 1];
        let mut forest = RandomForest::new(3, 5);
        forest.fit(&x, &y, 2).unwrap();
        let probs = forest.predict_proba(&[1.0, 1.0]).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_trees_are_reproducible() {
        let (x, y) = clusters(10);
        let mut a = RandomForest::new(5, 9);
        let mut b = RandomForest::new(5, 9);
        a.fit(&x, &y, 3).unwrap();
        b.fit(&x, &y, 3).unwrap();
        assert_eq!(a.predict_proba(&[0.0, 0.0]), b.predict_proba(&[0.0, 0.0]));
        assert!(RandomForest::new(0, 1).fit(&x, &y, 3).is_err());
    }
}
