//! Stratified k-fold cross-validation.
//!
//! Each class's rows are shuffled with one seeded RNG (negatives first, then
//! positives). The two shuffled lists are concatenated and position `p` is
//! dealt to fold `p mod k`, so every fold holds `floor(n_c / k)` or
//! `ceil(n_c / k)` rows of each class `c`.

use rayon::prelude::*;
use tracing::debug;

use crate::data::split::shuffled_class_indices;
use crate::domain::{CvSummary, Dataset, FoldMetrics, MlGateError, Result};
use crate::metrics::METRICS;
use crate::model::{Classifier, Estimator};
use crate::obs;
use crate::scoring;

/// Validation row indices per fold, each sorted ascending.
///
/// Folds are disjoint and together cover every row exactly once.
pub fn stratified_folds(ds: &Dataset, k: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(MlGateError::InvalidConfig(format!(
            "k_folds must be >= 2, got {k}"
        )));
    }
    if k > ds.n_rows() {
        return Err(MlGateError::InvalidConfig(format!(
            "k_folds ({k}) exceeds dataset rows ({})",
            ds.n_rows()
        )));
    }

    let (negatives, positives) = shuffled_class_indices(ds, seed);
    let mut folds = vec![Vec::with_capacity(ds.n_rows() / k + 2); k];
    for (pos, idx) in negatives.into_iter().chain(positives).enumerate() {
        folds[pos % k].push(idx);
    }
    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Training indices for `fold`: every row not in it.
fn complement(n_rows: usize, held_out: &[usize]) -> Vec<usize> {
    let mut in_fold = vec![false; n_rows];
    for &idx in held_out {
        in_fold[idx] = true;
    }
    (0..n_rows).filter(|&i| !in_fold[i]).collect()
}

fn evaluate_fold<E: Estimator>(
    estimator: &E,
    ds: &Dataset,
    fold: usize,
    held_out: &[usize],
) -> Result<FoldMetrics> {
    let train = ds.subset(&complement(ds.n_rows(), held_out));
    let valid = ds.subset(held_out);

    let model = estimator.fit(&train)?;
    let probs = model.predict_proba(&valid);
    let metrics = scoring::score(valid.labels(), &probs);

    let positives = valid.n_positive();
    METRICS.inc_folds_evaluated();
    obs::emit_fold_evaluated(fold, metrics.recall, metrics.precision, positives);

    Ok(FoldMetrics {
        fold,
        positives,
        negatives: valid.n_rows() - positives,
        metrics,
    })
}

/// Fit a fresh estimator per fold and aggregate the fold metrics.
///
/// With `parallel`, folds run on the rayon pool; results are collected in
/// fold order, so output is identical to the sequential path.
pub fn cross_validate<E: Estimator>(
    estimator: &E,
    ds: &Dataset,
    k: usize,
    seed: u64,
    parallel: bool,
) -> Result<CvSummary> {
    let folds = stratified_folds(ds, k, seed)?;
    debug!(k, rows = ds.n_rows(), parallel, "cross-validation starting");

    let fold_metrics: Vec<FoldMetrics> = if parallel {
        folds
            .par_iter()
            .enumerate()
            .map(|(i, held_out)| evaluate_fold(estimator, ds, i, held_out))
            .collect::<Result<_>>()?
    } else {
        folds
            .iter()
            .enumerate()
            .map(|(i, held_out)| evaluate_fold(estimator, ds, i, held_out))
            .collect::<Result<_>>()?
    };

    let summary = CvSummary::from_folds(k, seed, fold_metrics);
    obs::emit_cv_completed(k, summary.recall.mean, summary.recall.std);
    Ok(summary)
}
