//! Domain models for mlgate.
//!
//! Canonical definitions for the core entities:
//! - `Dataset`: feature table plus binary labels
//! - `FoldMetrics` / `CvSummary` / `TestMetrics`: evaluation records
//! - `RunId` / `RunStatus`: training run identity and lifecycle

pub mod dataset;
pub mod error;
pub mod metrics;
pub mod run;

// Re-export main types and errors
pub use dataset::{Dataset, Label};
pub use error::{DataError, MlGateError, Result};
pub use metrics::{
    AggregateMetrics, ClassificationMetrics, ConfusionMatrix, CvSummary, FoldMetrics,
    MetricSummary, TestMetrics,
};
pub use run::{RunId, RunStatus};
