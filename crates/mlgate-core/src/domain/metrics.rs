//! Evaluation metric records produced by cross-validation and held-out evaluation.

use serde::{Deserialize, Serialize};

/// 2x2 confusion matrix with the positive class as "malignant".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// Rows whose true label is positive.
    pub fn actual_positive(&self) -> usize {
        self.true_positive + self.false_negative
    }

    /// Rows whose true label is negative.
    pub fn actual_negative(&self) -> usize {
        self.true_negative + self.false_positive
    }
}

/// Point metrics for one evaluation. Every field lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Metrics for a single cross-validation fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    /// Fold index in 0..k.
    pub fold: usize,
    /// Positive rows in the validation fold.
    pub positives: usize,
    /// Negative rows in the validation fold.
    pub negatives: usize,
    pub metrics: ClassificationMetrics,
}

/// Mean and sample standard deviation (N-1 denominator) of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    /// Summarise `values`. A single value has std 0; no values yield NaN.
    pub fn from_values(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        // Identical values summarise exactly, free of summation rounding.
        if values.iter().all(|v| *v == values[0]) {
            return Self {
                mean: values[0],
                std: 0.0,
            };
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Self {
            mean,
            std: var.sqrt(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.mean.is_finite() && self.std.is_finite()
    }
}

/// Aggregate cross-validation statistics across `k` folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub k: usize,
    pub seed: u64,
    pub folds: Vec<FoldMetrics>,
    pub accuracy: MetricSummary,
    pub precision: MetricSummary,
    pub recall: MetricSummary,
    pub f1: MetricSummary,
}

impl CvSummary {
    /// Aggregate per-fold metrics (in fold order).
    pub fn from_folds(k: usize, seed: u64, folds: Vec<FoldMetrics>) -> Self {
        let pick = |f: fn(&ClassificationMetrics) -> f64| -> MetricSummary {
            let values: Vec<f64> = folds.iter().map(|fm| f(&fm.metrics)).collect();
            MetricSummary::from_values(&values)
        };
        let accuracy = pick(|m| m.accuracy);
        let precision = pick(|m| m.precision);
        let recall = pick(|m| m.recall);
        let f1 = pick(|m| m.f1);
        Self {
            k,
            seed,
            folds,
            accuracy,
            precision,
            recall,
            f1,
        }
    }

    /// Named summaries, in a stable order.
    pub fn summaries(&self) -> [(&'static str, MetricSummary); 4] {
        [
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
        ]
    }
}

/// Single-shot metrics on the held-out test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
}

/// Cross-validation aggregates plus held-out test metrics.
///
/// Only `cv` feeds the promotion decision; `test` is recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub cv: CvSummary,
    pub test: TestMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn fold(idx: usize, recall: f64) -> FoldMetrics {
        FoldMetrics {
            fold: idx,
            positives: 4,
            negatives: 6,
            metrics: ClassificationMetrics {
                accuracy: 0.9,
                precision: 0.8,
                recall,
                f1: 0.85,
            },
        }
    }

    #[test]
    fn summary_uses_sample_std() {
        let s = MetricSummary::from_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_abs_diff_eq!(s.mean, 2.5);
        // sum of squared deviations 5.0 over n-1 = 3
        assert_abs_diff_eq!(s.std, (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn equal_values_have_zero_std() {
        let s = MetricSummary::from_values(&[0.97; 5]);
        assert_abs_diff_eq!(s.mean, 0.97, epsilon = 1e-12);
        assert_eq!(s.std, 0.0);
    }

    #[test]
    fn empty_summary_is_not_finite() {
        assert!(!MetricSummary::from_values(&[]).is_finite());
    }

    #[test]
    fn cv_summary_aggregates_each_metric() {
        let cv = CvSummary::from_folds(3, 42, vec![fold(0, 1.0), fold(1, 0.9), fold(2, 0.8)]);
        assert_eq!(cv.k, 3);
        assert_abs_diff_eq!(cv.recall.mean, 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(cv.recall.std, 0.1, epsilon = 1e-12);
        assert_eq!(cv.accuracy.std, 0.0);
    }

    #[test]
    fn confusion_totals() {
        let cm = ConfusionMatrix {
            true_positive: 3,
            false_positive: 1,
            true_negative: 5,
            false_negative: 2,
        };
        assert_eq!(cm.total(), 11);
        assert_eq!(cm.actual_positive(), 5);
        assert_eq!(cm.actual_negative(), 6);
    }
}
