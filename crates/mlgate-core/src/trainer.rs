//! Held-out training and evaluation.
//!
//! One seeded stratified split; cross-validation on the train portion; a
//! final fit on the whole train portion scored once on the test portion.

use tracing::debug;

use crate::cv;
use crate::data::stratified_train_test_split;
use crate::domain::{AggregateMetrics, Dataset, Result, TestMetrics};
use crate::model::{Classifier, Estimator};
use crate::obs;
use crate::scoring;

/// Knobs for [`train_and_evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingPlan {
    pub test_size: f64,
    pub k_folds: usize,
    pub seed: u64,
    pub parallel: bool,
}

/// A fitted model and every metric computed on the way.
#[derive(Debug, Clone)]
pub struct TrainingResult<M> {
    pub model: M,
    pub metrics: AggregateMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Fit on `train`, score once on `test`.
pub fn evaluate_holdout<E: Estimator>(
    estimator: &E,
    train: &Dataset,
    test: &Dataset,
) -> Result<(E::Model, TestMetrics)> {
    let model = estimator.fit(train)?;
    let probs = model.predict_proba(test);
    let metrics = scoring::test_metrics(test.labels(), &probs);
    obs::emit_test_evaluated(metrics.recall, metrics.roc_auc);
    Ok((model, metrics))
}

pub fn train_and_evaluate<E: Estimator>(
    estimator: &E,
    ds: &Dataset,
    plan: &TrainingPlan,
) -> Result<TrainingResult<E::Model>> {
    let (train, test) = stratified_train_test_split(ds, plan.test_size, plan.seed)?;
    debug!(
        train_rows = train.n_rows(),
        test_rows = test.n_rows(),
        "held-out split"
    );

    let cv = cv::cross_validate(estimator, &train, plan.k_folds, plan.seed, plan.parallel)?;
    let (model, test_metrics) = evaluate_holdout(estimator, &train, &test)?;

    Ok(TrainingResult {
        model,
        metrics: AggregateMetrics {
            cv,
            test: test_metrics,
        },
        train_rows: train.n_rows(),
        test_rows: test.n_rows(),
    })
}
