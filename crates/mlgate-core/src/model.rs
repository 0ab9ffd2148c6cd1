//! Estimators and fitted classifiers.
//!
//! The pipeline is written against [`Estimator`] / [`Classifier`] so cross
//! validation can fit a fresh, identically configured model per fold. The
//! shipped implementation is an L2-regularised logistic regression on
//! standardised features, trained by sequential coordinate descent with
//! incremental margin updates.
//!
//! # Update rule
//!
//! With `g_i = p_i - y_i` and `h_i = p_i (1 - p_i)`, each weight moves by
//!
//! ```text
//! delta_j = -(sum_i g_i x_ij + lambda w_j) / (sum_i h_i x_ij^2 + lambda) * learning_rate
//! ```
//!
//! and the (unregularised) bias by `-sum g / sum h * learning_rate`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Dataset, MlGateError, Result};

/// Hessian sums below this are treated as zero curvature.
const MIN_HESSIAN: f64 = 1e-12;

/// Something that can be fit to a dataset.
pub trait Estimator: Send + Sync {
    type Model: Classifier;

    /// Fit a new model. Never mutates `self`, so one estimator serves every fold.
    fn fit(&self, ds: &Dataset) -> Result<Self::Model>;
}

/// A fitted binary classifier.
pub trait Classifier: Send + Sync {
    fn n_features(&self) -> usize;

    /// Probability of the positive class for one row.
    ///
    /// `row.len()` must equal [`Self::n_features`].
    fn predict_proba_row(&self, row: &[f64]) -> f64;

    fn predict_proba(&self, ds: &Dataset) -> Vec<f64> {
        ds.rows().map(|(row, _)| self.predict_proba_row(row)).collect()
    }
}

/// Hyper-parameters for [`LogisticRegression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    /// L2 penalty (inverse of the usual `C`).
    pub l2: f64,
    /// Maximum coordinate-descent sweeps.
    pub max_iter: usize,
    /// Stop when no parameter moves more than this in a sweep.
    pub tol: f64,
    pub learning_rate: f64,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            l2: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 1.0,
        }
    }
}

impl LogisticRegressionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.l2.is_finite() && self.l2 > 0.0) {
            return Err(MlGateError::InvalidConfig(format!(
                "l2 must be positive, got {}",
                self.l2
            )));
        }
        if self.max_iter == 0 {
            return Err(MlGateError::InvalidConfig("max_iter must be >= 1".into()));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(MlGateError::InvalidConfig(format!(
                "tol must be positive, got {}",
                self.tol
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(MlGateError::InvalidConfig(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Per-feature centring and scaling learned from training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    /// Population standard deviations; constant columns use 1.0.
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(ds: &Dataset) -> Self {
        let n = ds.n_rows().max(1) as f64;
        let width = ds.n_features();
        let mut means = vec![0.0; width];
        for (row, _) in ds.rows() {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; width];
        for (row, _) in ds.rows() {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in scales.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > 0.0 { std } else { 1.0 };
        }
        Self { means, scales }
    }

    #[inline]
    fn transform_value(&self, col: usize, value: f64) -> f64 {
        (value - self.means[col]) / self.scales[col]
    }
}

/// Logistic regression hyperparameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogisticRegression {
    pub config: LogisticRegressionConfig,
}

impl LogisticRegression {
    pub fn new(config: LogisticRegressionConfig) -> Self {
        Self { config }
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl Estimator for LogisticRegression {
    type Model = LogisticModel;

    fn fit(&self, ds: &Dataset) -> Result<LogisticModel> {
        if ds.is_empty() {
            return Err(MlGateError::Training("cannot fit on an empty dataset".into()));
        }
        let cfg = &self.config;
        let n_rows = ds.n_rows();
        let n_features = ds.n_features();
        let scaler = StandardScaler::fit(ds);

        // Feature-major standardised copy for cache-friendly column sweeps.
        let mut columns = vec![0.0; n_rows * n_features];
        for (i, (row, _)) in ds.rows().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                columns[j * n_rows + i] = scaler.transform_value(j, v);
            }
        }
        let targets: Vec<f64> = ds.labels().iter().map(|l| f64::from(l.as_u8())).collect();

        let mut weights = vec![0.0; n_features];
        let mut bias = 0.0;
        let mut margins = vec![0.0; n_rows];
        let mut converged = false;
        let mut iterations = 0;

        for _ in 0..cfg.max_iter {
            iterations += 1;
            let mut max_delta: f64 = 0.0;

            let (sum_grad, sum_hess) = margins.iter().zip(&targets).fold(
                (0.0, 0.0),
                |(g, h), (&m, &y)| {
                    let p = sigmoid(m);
                    (g + p - y, h + p * (1.0 - p))
                },
            );
            if sum_hess > MIN_HESSIAN {
                let delta = -sum_grad / sum_hess * cfg.learning_rate;
                bias += delta;
                margins.iter_mut().for_each(|m| *m += delta);
                max_delta = max_delta.max(delta.abs());
            }

            for (j, w) in weights.iter_mut().enumerate() {
                let col = &columns[j * n_rows..(j + 1) * n_rows];
                let mut sum_grad = 0.0;
                let mut sum_hess = 0.0;
                for ((&x, &m), &y) in col.iter().zip(&margins).zip(&targets) {
                    let p = sigmoid(m);
                    sum_grad += (p - y) * x;
                    sum_hess += p * (1.0 - p) * x * x;
                }
                let denom = sum_hess + cfg.l2;
                if denom < MIN_HESSIAN {
                    continue;
                }
                let delta = -(sum_grad + cfg.l2 * *w) / denom * cfg.learning_rate;
                *w += delta;
                for (m, &x) in margins.iter_mut().zip(col) {
                    *m += delta * x;
                }
                max_delta = max_delta.max(delta.abs());
            }

            if !max_delta.is_finite() {
                return Err(MlGateError::Training(
                    "coordinate descent diverged".to_string(),
                ));
            }
            if max_delta < cfg.tol {
                converged = true;
                break;
            }
        }

        if converged {
            debug!(iterations, rows = n_rows, "logistic regression converged");
        } else {
            warn!(
                event = "model.not_converged",
                max_iter = cfg.max_iter,
                rows = n_rows,
                "logistic regression hit max_iter before converging"
            );
        }

        Ok(LogisticModel {
            feature_names: ds.feature_names().to_vec(),
            scaler,
            weights,
            bias,
            iterations,
            converged,
        })
    }
}

/// Fitted logistic regression. This is the serialized model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl LogisticModel {
    /// Check that a raw feature vector fits this model.
    pub fn check_features(&self, row: &[f64]) -> Result<()> {
        if row.len() != self.weights.len() {
            return Err(MlGateError::FeatureCountMismatch {
                expected: self.weights.len(),
                actual: row.len(),
            });
        }
        Ok(())
    }

    /// Internal consistency of a deserialized artifact.
    pub fn validate(&self) -> Result<()> {
        let n = self.weights.len();
        if self.feature_names.len() != n
            || self.scaler.means.len() != n
            || self.scaler.scales.len() != n
        {
            return Err(MlGateError::ArtifactMismatch(
                "model dimensions are inconsistent".to_string(),
            ));
        }
        Ok(())
    }
}

impl Classifier for LogisticModel {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn predict_proba_row(&self, row: &[f64]) -> f64 {
        let margin = self.bias
            + row
                .iter()
                .enumerate()
                .zip(&self.weights)
                .map(|((j, &v), w)| w * self.scaler.transform_value(j, v))
                .sum::<f64>();
        sigmoid(margin)
    }
}
