//! Structured lifecycle events for training runs.
//!
//! Every event carries an `event` field (`run.started`, `cv.fold_evaluated`,
//! `gate.evaluated`, `promotion.applied`, ...) so log pipelines can filter on
//! it. Set `MLGATE_LOG` to tune verbosity.

use tracing::{info, warn};

use crate::domain::RunStatus;

/// RAII guard that enters a run-scoped span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter(run_id.as_str());
/// // every event below is tagged with run_id
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("mlgate.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, rows: usize, features: usize, k_folds: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        rows = rows,
        features = features,
        k_folds = k_folds,
    );
}

pub fn emit_fold_evaluated(fold: usize, recall: f64, precision: f64, positives: usize) {
    info!(
        event = "cv.fold_evaluated",
        fold = fold,
        recall = recall,
        precision = precision,
        positives = positives,
    );
}

pub fn emit_cv_completed(k: usize, recall_mean: f64, recall_std: f64) {
    info!(
        event = "cv.completed",
        k = k,
        recall_mean = recall_mean,
        recall_std = recall_std,
    );
}

pub fn emit_model_compared(model: &str, k: usize, recall_mean: f64, recall_std: f64) {
    info!(
        event = "compare.model_scored",
        model = model,
        k = k,
        recall_mean = recall_mean,
        recall_std = recall_std,
    );
}

/// Held-out metrics are audit-only; logged for operators, never gated on.
pub fn emit_test_evaluated(recall: f64, roc_auc: f64) {
    info!(event = "test.evaluated", recall = recall, roc_auc = roc_auc);
}

pub fn emit_gate_evaluated(run_id: &str, recall_mean: f64, recall_std: f64, promote: bool) {
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        recall_mean = recall_mean,
        recall_std = recall_std,
        promote = promote,
    );
}

pub fn emit_promotion_applied(run_id: &str, metadata_digest: &str) {
    info!(
        event = "promotion.applied",
        run_id = %run_id,
        metadata = %metadata_digest,
    );
}

pub fn emit_rollback(from_run: &str, to_run: &str) {
    info!(event = "promotion.rolled_back", from_run = %from_run, to_run = %to_run);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, status: RunStatus) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        status = ?status,
    );
}

/// Run could not be finalized cleanly (warning level).
pub fn emit_run_finalize_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.finalize_error", run_id = %run_id, error = %error);
}
