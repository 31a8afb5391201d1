//! Gradient-boosted binary classifier with logistic loss.
//!
//! Each round fits a second-order regression tree to the gradient
//! (`p - y`) and hessian (`p(1-p)`) of the log loss, on a seeded sample of
//! rows and columns. The margin starts at the log-odds of the training base
//! rate and each tree's output is shrunk by the learning rate.

use super::matrix::FeatureMatrix;
use super::tree::{RegressionTree, TreeParams};
use super::ModelError;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PROB_CLAMP: f64 = 1e-6;
const MIN_HESSIAN: f64 = 1e-16;

/// Booster hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Shrinkage applied to each tree's output
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows sampled per tree
    pub subsample: f64,
    /// Fraction of columns sampled per tree
    pub colsample_bytree: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// Minimum gain to keep a split
    pub gamma: f64,
    pub seed: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 5,
            subsample: 0.7,
            colsample_bytree: 0.7,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            seed: 42,
        }
    }
}

impl GbmParams {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParams("n_estimators must be > 0".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ModelError::InvalidParams("learning_rate must be > 0".into()));
        }
        if self.max_depth == 0 {
            return Err(ModelError::InvalidParams("max_depth must be > 0".into()));
        }
        for (name, v) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(ModelError::InvalidParams(format!(
                    "{name} must be in (0, 1], got {v}"
                )));
            }
        }
        if self.min_child_weight < 0.0 || self.reg_lambda < 0.0 || self.gamma < 0.0 {
            return Err(ModelError::InvalidParams(
                "min_child_weight, reg_lambda and gamma must be >= 0".into(),
            ));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            lambda: self.reg_lambda,
            gamma: self.gamma,
        }
    }
}

/// A fitted booster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    params: GbmParams,
    n_features: usize,
    base_margin: f64,
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn sample_count(total: usize, ratio: f64) -> usize {
    ((total as f64 * ratio).round() as usize).clamp(1, total)
}

fn sorted_sample(rng: &mut StdRng, total: usize, ratio: f64) -> Vec<usize> {
    let amount = sample_count(total, ratio);
    if amount == total {
        return (0..total).collect();
    }
    let mut idx = sample(rng, total, amount).into_vec();
    idx.sort_unstable();
    idx
}

impl GradientBoostedClassifier {
    /// Fit on `x` with binary labels `y` (0 or 1).
    pub fn fit(params: &GbmParams, x: &FeatureMatrix, y: &[u8]) -> Result<Self, ModelError> {
        params.validate()?;
        let n = x.n_rows();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(ModelError::LengthMismatch {
                rows: n,
                labels: y.len(),
            });
        }
        if x.n_cols() == 0 {
            return Err(ModelError::InvalidParams("feature matrix has no columns".into()));
        }

        let labels: Vec<f64> = y.iter().map(|&v| f64::from(u8::from(v > 0))).collect();
        let rate = (labels.iter().sum::<f64>() / n as f64).clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
        let base_margin = (rate / (1.0 - rate)).ln();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut margins = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut importance = vec![0.0; x.n_cols()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let tree_params = params.tree_params();

        for round in 0..params.n_estimators {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                grad[i] = p - labels[i];
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let rows = sorted_sample(&mut rng, n, params.subsample);
            let cols = sorted_sample(&mut rng, x.n_cols(), params.colsample_bytree);
            let tree =
                RegressionTree::fit(x, &grad, &hess, rows, &cols, tree_params, &mut importance);

            for (i, m) in margins.iter_mut().enumerate() {
                *m += params.learning_rate * tree.predict(x.row(i));
            }
            if round % 50 == 0 {
                debug!(round, leaves = tree.n_leaves(), "boosting round");
            }
            trees.push(tree);
        }

        Ok(Self {
            params: params.clone(),
            n_features: x.n_cols(),
            base_margin,
            trees,
            importance,
        })
    }

    pub fn params(&self) -> &GbmParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Raw log-odds for one row.
    pub fn predict_margin(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.n_features,
                found: row.len(),
            });
        }
        if let Some(col) = row.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput { row: 0, col });
        }
        let lr = self.params.learning_rate;
        Ok(self.base_margin + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>())
    }

    /// P(class = 1) for one row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        self.predict_margin(row).map(sigmoid)
    }

    pub fn predict(&self, row: &[f64]) -> Result<u8, ModelError> {
        self.predict_proba(row).map(|p| u8::from(p > 0.5))
    }

    pub fn predict_proba_batch(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        (0..x.n_rows()).map(|i| self.predict_proba(x.row(i))).collect()
    }

    /// Split gain per column, normalized to sum to 1 (all zero if no split was made).
    pub fn feature_importance(&self) -> Vec<f64> {
        let total: f64 = self.importance.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.importance.len()];
        }
        self.importance.iter().map(|v| v / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (FeatureMatrix, Vec<u8>) {
        let mut x = FeatureMatrix::with_capacity(3, n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let signal = (i as f64 * 0.37).sin();
            let noise = (i as f64 * 1.91).cos();
            x.push_row(&[signal, noise, i as f64 % 5.0]).unwrap();
            y.push(u8::from(signal > 0.0));
        }
        (x, y)
    }

    fn small() -> GbmParams {
        GbmParams {
            n_estimators: 30,
            learning_rate: 0.3,
            max_depth: 3,
            ..GbmParams::default()
        }
    }

    #[test]
    fn defaults_match_training_setup() {
        let p = GbmParams::default();
        assert_eq!(p.n_estimators, 200);
        assert_eq!(p.learning_rate, 0.05);
        assert_eq!(p.max_depth, 5);
        assert_eq!(p.subsample, 0.7);
        assert_eq!(p.colsample_bytree, 0.7);
        assert_eq!(p.seed, 42);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn learns_separable_signal() {
        let (x, y) = separable(200);
        let model = GradientBoostedClassifier::fit(&small(), &x, &y).unwrap();
        let correct = (0..x.n_rows())
            .filter(|&i| model.predict(x.row(i)).unwrap() == y[i])
            .count();
        assert!(correct as f64 / 200.0 > 0.95, "accuracy {correct}/200");

        let imp = model.feature_importance();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1] && imp[0] > imp[2]);
    }

    #[test]
    fn same_seed_same_model() {
        let (x, y) = separable(120);
        let a = GradientBoostedClassifier::fit(&small(), &x, &y).unwrap();
        let b = GradientBoostedClassifier::fit(&small(), &x, &y).unwrap();
        assert_eq!(a, b);

        let other = GbmParams { seed: 7, ..small() };
        let c = GradientBoostedClassifier::fit(&other, &x, &y).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn single_class_predicts_that_class() {
        let (x, _) = separable(50);
        let y = vec![1u8; 50];
        let model = GradientBoostedClassifier::fit(&small(), &x, &y).unwrap();
        let p = model.predict_proba(x.row(0)).unwrap();
        assert!(p > 0.99);
    }

    #[test]
    fn rejects_bad_input() {
        let (x, y) = separable(20);
        assert!(matches!(
            GradientBoostedClassifier::fit(&small(), &FeatureMatrix::new(3), &[]),
            Err(ModelError::EmptyTrainingSet)
        ));
        assert!(matches!(
            GradientBoostedClassifier::fit(&small(), &x, &y[..10]),
            Err(ModelError::LengthMismatch { .. })
        ));
        let bad = GbmParams {
            subsample: 0.0,
            ..small()
        };
        assert!(matches!(
            GradientBoostedClassifier::fit(&bad, &x, &y),
            Err(ModelError::InvalidParams(_))
        ));

        let model = GradientBoostedClassifier::fit(&small(), &x, &y).unwrap();
        assert!(matches!(
            model.predict_proba(&[1.0, 2.0]),
            Err(ModelError::FeatureCountMismatch { expected: 3, found: 2 })
        ));
        assert!(matches!(
            model.predict_proba(&[1.0, f64::NAN, 0.0]),
            Err(ModelError::NonFiniteInput { .. })
        ));
    }

    #[test]
    fn probabilities_are_in_unit_interval() {
        let (x, y) = separable(80);
        let model = GradientBoostedClassifier::fit(&small(), &x, &y).unwrap();
        for p in model.predict_proba_batch(&x).unwrap() {
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
