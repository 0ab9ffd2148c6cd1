//! Binary classification scoring.
//!
//! Zero-division policy: precision, recall and f1 are `0.0` whenever their
//! denominator is zero (no positive predictions, no positive rows). A
//! degenerate fold is scored, never skipped.

use crate::domain::{ClassificationMetrics, ConfusionMatrix, Label, TestMetrics};

/// Probability above which a row is predicted positive.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Hard prediction for a probability of the positive class.
pub fn classify(probability: f64) -> Label {
    if probability > DECISION_THRESHOLD {
        Label::Positive
    } else {
        Label::Negative
    }
}

/// Tally predictions against true labels.
pub fn confusion_matrix(actual: &[Label], predicted: &[Label]) -> ConfusionMatrix {
    debug_assert_eq!(actual.len(), predicted.len());
    let mut cm = ConfusionMatrix::default();
    for (a, p) in actual.iter().zip(predicted) {
        match (a, p) {
            (Label::Positive, Label::Positive) => cm.true_positive += 1,
            (Label::Negative, Label::Positive) => cm.false_positive += 1,
            (Label::Negative, Label::Negative) => cm.true_negative += 1,
            (Label::Positive, Label::Negative) => cm.false_negative += 1,
        }
    }
    cm
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Accuracy, precision, recall and f1 from a confusion matrix.
pub fn metrics_from_confusion(cm: &ConfusionMatrix) -> ClassificationMetrics {
    let accuracy = ratio(cm.true_positive + cm.true_negative, cm.total());
    let precision = ratio(cm.true_positive, cm.true_positive + cm.false_positive);
    let recall = ratio(cm.true_positive, cm.actual_positive());
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassificationMetrics {
        accuracy,
        precision,
        recall,
        f1,
    }
}

/// Score positive-class probabilities against true labels.
pub fn score(actual: &[Label], probabilities: &[f64]) -> ClassificationMetrics {
    let predicted: Vec<Label> = probabilities.iter().map(|&p| classify(p)).collect();
    metrics_from_confusion(&confusion_matrix(actual, &predicted))
}

/// Full held-out report: point metrics, ROC-AUC and the confusion matrix.
pub fn test_metrics(actual: &[Label], probabilities: &[f64]) -> TestMetrics {
    let predicted: Vec<Label> = probabilities.iter().map(|&p| classify(p)).collect();
    let confusion = confusion_matrix(actual, &predicted);
    let m = metrics_from_confusion(&confusion);
    TestMetrics {
        accuracy: m.accuracy,
        precision: m.precision,
        recall: m.recall,
        f1: m.f1,
        roc_auc: roc_auc(actual, probabilities),
        confusion,
    }
}

/// Area under the ROC curve via the rank-sum (Mann-Whitney U) statistic.
///
/// Tied scores receive their average rank. Returns 0.5 when only one class
/// is present.
pub fn roc_auc(actual: &[Label], scores: &[f64]) -> f64 {
    let n = scores.len();

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let n_pos = actual.iter().filter(|l| l.is_positive()).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    // Ranks are assigned in descending score order, then flipped.
    let mut rank_sum_pos = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && (scores[indices[i]] - scores[indices[j]]).abs() < 1e-12 {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &indices[i..j] {
            if actual[idx].is_positive() {
                rank_sum_pos += avg_rank;
            }
        }
        i = j;
    }

    let n_pos_f = n_pos as f64;
    let n_neg_f = n_neg as f64;
    let sum_ascending_ranks = n_pos_f * (n as f64 + 1.0) - rank_sum_pos;
    (sum_ascending_ranks - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg_f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use Label::{Negative as N, Positive as P};

    #[test]
    fn perfect_predictions() {
        let m = score(&[P, P, N, N], &[0.9, 0.8, 0.1, 0.2]);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1, 1.0);
    }

    #[test]
    fn mixed_predictions() {
        // tp=2 fn=1 fp=1 tn=2
        let m = score(&[P, P, P, N, N, N], &[0.9, 0.7, 0.3, 0.6, 0.2, 0.1]);
        assert_abs_diff_eq!(m.accuracy, 4.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.precision, 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.recall, 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.f1, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn no_positive_rows_scores_zero() {
        let m = score(&[N, N, N], &[0.1, 0.2, 0.3]);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn no_positive_predictions_scores_zero() {
        let m = score(&[P, N], &[0.1, 0.2]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn threshold_is_strict() {
        assert_eq!(classify(0.5), Label::Negative);
        assert_eq!(classify(0.5000001), Label::Positive);
    }

    #[test]
    fn auc_perfect() {
        let auc = roc_auc(&[P, P, N, N], &[0.9, 0.8, 0.3, 0.2]);
        assert_abs_diff_eq!(auc, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn auc_all_tied() {
        let auc = roc_auc(&[P, N, P, N], &[0.5, 0.5, 0.5, 0.5]);
        assert_abs_diff_eq!(auc, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn auc_worst() {
        let auc = roc_auc(&[P, P, N, N], &[0.2, 0.3, 0.8, 0.9]);
        assert!(auc < 0.01);
    }

    #[test]
    fn auc_single_class() {
        assert_eq!(roc_auc(&[N, N], &[0.1, 0.9]), 0.5);
    }

    #[test]
    fn auc_partial_ordering() {
        // one of four positive/negative pairs is misordered
        let auc = roc_auc(&[P, N, P, N], &[0.9, 0.8, 0.7, 0.1]);
        assert_abs_diff_eq!(auc, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_metrics_include_confusion() {
        let t = test_metrics(&[P, N, N], &[0.9, 0.6, 0.1]);
        assert_eq!(t.confusion.true_positive, 1);
        assert_eq!(t.confusion.false_positive, 1);
        assert_eq!(t.confusion.true_negative, 1);
        assert_abs_diff_eq!(t.roc_auc, 1.0, epsilon = 1e-12);
    }
}
