//! Domain-level error taxonomy for mlgate.

use crate::cas::CasError;

/// Errors produced while turning raw rows into a [`Dataset`](super::Dataset).
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("dataset has no rows")]
    Empty,

    #[error("missing column: {column}")]
    MissingColumn { column: String },

    #[error("row {row}: column '{column}' is empty")]
    MissingValue { row: usize, column: String },

    #[error("row {row}: column '{column}' is not numeric: {value:?}")]
    NotNumeric {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}: unknown label {value:?}")]
    UnknownLabel { row: usize, value: String },

    #[error("row {row}: expected {expected} fields, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("dataset contains a single class ({0}); both classes are required")]
    SingleClass(&'static str),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// mlgate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum MlGateError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("expected {expected} features, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error("no promoted model")]
    NoPromotedModel,

    #[error("promotion refused: {0}")]
    PromotionRefused(String),

    #[error("nothing to roll back to: {0}")]
    RollbackUnavailable(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run {0} is already finalized")]
    RunFinalized(String),

    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("cas error: {0}")]
    Cas(#[from] CasError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mlgate domain operations.
pub type Result<T> = std::result::Result<T, MlGateError>;
