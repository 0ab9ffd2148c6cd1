//! mlgate Core Library
//!
//! Cross-validated training, a recall-based promotion gate and a
//! content-addressed artifact store with an atomically swapped `CURRENT`
//! pointer. Tree baselines can be scored against the logistic model with
//! [`compare_models`].

pub mod cas;
pub mod compare;
pub mod config;
pub mod cv;
pub mod data;
pub mod domain;
pub mod gate;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod pipeline;
pub mod promote;
pub mod reporting;
pub mod scoring;
pub mod serving;
pub mod store;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trainer;
pub mod tree;

pub use domain::{
    AggregateMetrics, ClassificationMetrics, ConfusionMatrix, CvSummary, DataError, Dataset,
    FoldMetrics, Label, MetricSummary, MlGateError, Result, RunId, RunStatus, TestMetrics,
};

pub use cas::fs::FsCasStore;
pub use cas::{CasError, CasStore, Digest};

pub use compare::{
    compare_models, run_comparison, CompareConfig, MetricLeader, ModelComparison, ModelKind,
    ModelScore,
};
pub use config::{CvConfig, DataConfig, PipelineConfig, SplitConfig, StoreConfig};
pub use cv::{cross_validate, stratified_folds};
pub use data::{load_csv, parse_csv, stratified_subsample, stratified_train_test_split, LoadedDataset};
pub use gate::{
    decide, evaluate_gate, GateRule, GateRuleSet, GateVerdict, PromotionThresholds,
    PromotionVerdict, Violation,
};
pub use metrics::METRICS;
pub use model::{
    Classifier, Estimator, LogisticModel, LogisticRegression, LogisticRegressionConfig,
};
pub use obs::{
    emit_cv_completed, emit_fold_evaluated, emit_gate_evaluated, emit_model_compared,
    emit_promotion_applied, emit_rollback, emit_run_finalize_error, emit_run_finished,
    emit_run_started, emit_test_evaluated, RunSpan,
};
pub use pipeline::{PipelineOutcome, TrainingPipeline};
pub use promote::{Promotion, PromotionMetadata};
pub use serving::{Confidence, Prediction, Predictor};
pub use telemetry::init_tracing;
pub use store::{ArtifactStore, CurrentPointer, DatasetShape, RunParams, RunRecord};
pub use trainer::{evaluate_holdout, train_and_evaluate, TrainingPlan, TrainingResult};
pub use tree::{
    DecisionTree, DecisionTreeConfig, ForestModel, RandomForest, RandomForestConfig, TreeModel,
    TreeNode,
};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
