//! Process-wide counters for training runs.
//!
//! Counters are bumped silently where things happen and emitted together by
//! [`Metrics::flush`] at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters. No allocation, no locking.
pub struct Metrics {
    runs_started: AtomicU64,
    folds_evaluated: AtomicU64,
    promotions: AtomicU64,
    rejections: AtomicU64,
    predictions_served: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            folds_evaluated: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            predictions_served: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_started", "counter incremented");
    }

    pub fn inc_folds_evaluated(&self) {
        self.folds_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "folds_evaluated", "counter incremented");
    }

    pub fn inc_promotions(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "promotions", "counter incremented");
    }

    pub fn inc_rejections(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rejections", "counter incremented");
    }

    pub fn inc_predictions(&self) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            folds_evaluated = self.folds_evaluated(),
            promotions = self.promotions(),
            rejections = self.rejections(),
            predictions_served = self.predictions_served(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn folds_evaluated(&self) -> u64 {
        self.folds_evaluated.load(Ordering::Relaxed)
    }

    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    pub fn predictions_served(&self) -> u64 {
        self.predictions_served.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_started.store(0, Ordering::Relaxed);
        self.folds_evaluated.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.rejections.store(0, Ordering::Relaxed);
        self.predictions_served.store(0, Ordering::Relaxed);
    }
}
