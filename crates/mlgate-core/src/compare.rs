//! Cross-validated comparison of model families.
//!
//! Every candidate is scored on the same stratified folds of the full
//! dataset. The comparison is informational only; promotion always trains
//! the logistic model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::cv::cross_validate;
use crate::data::{load_csv, stratified_subsample};
use crate::domain::{CvSummary, Dataset, MetricSummary, MlGateError, Result};
use crate::model::LogisticRegression;
use crate::obs;
use crate::pipeline::SMOKE_K_FOLDS;
use crate::tree::{DecisionTree, DecisionTreeConfig, RandomForest, RandomForestConfig};

/// A model family that can take part in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    DecisionTree,
    RandomForest,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::LogisticRegression,
        ModelKind::DecisionTree,
        ModelKind::RandomForest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::DecisionTree => "decision_tree",
            ModelKind::RandomForest => "random_forest",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::DecisionTree => "Decision Tree",
            ModelKind::RandomForest => "Random Forest",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = MlGateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "logistic_regression" | "lr" => Ok(ModelKind::LogisticRegression),
            "decision_tree" | "tree" | "dt" => Ok(ModelKind::DecisionTree),
            "random_forest" | "forest" | "rf" => Ok(ModelKind::RandomForest),
            other => Err(MlGateError::InvalidConfig(format!(
                "unknown model {other:?} (expected logistic_regression, decision_tree or random_forest)"
            ))),
        }
    }
}

/// Which models to compare and how the tree baselines are grown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    pub models: Vec<ModelKind>,
    pub tree: DecisionTreeConfig,
    pub forest: RandomForestConfig,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            models: ModelKind::ALL.to_vec(),
            tree: DecisionTreeConfig::default(),
            forest: RandomForestConfig::default(),
        }
    }
}

impl CompareConfig {
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(MlGateError::InvalidConfig(
                "compare needs at least one model".into(),
            ));
        }
        for (i, model) in self.models.iter().enumerate() {
            if self.models[..i].contains(model) {
                return Err(MlGateError::InvalidConfig(format!(
                    "model {model} listed twice"
                )));
            }
        }
        self.tree.validate()?;
        self.forest.validate()
    }
}

/// Cross-validation result for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: ModelKind,
    pub cv: CvSummary,
}

/// The model with the highest mean for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricLeader {
    pub metric: String,
    pub model: ModelKind,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub k: usize,
    pub seed: u64,
    pub rows: usize,
    /// In the order the models were requested.
    pub scores: Vec<ModelScore>,
}

impl ModelComparison {
    pub fn score(&self, model: ModelKind) -> Option<&ModelScore> {
        self.scores.iter().find(|s| s.model == model)
    }

    /// Leader per metric, in `accuracy, precision, recall, f1` order.
    ///
    /// Ties go to the model listed first. A non-finite mean never leads.
    pub fn best_per_metric(&self) -> Vec<MetricLeader> {
        let Some(first) = self.scores.first() else {
            return Vec::new();
        };
        first
            .cv
            .summaries()
            .iter()
            .enumerate()
            .filter_map(|(m, (name, _))| {
                let mut best: Option<(ModelKind, MetricSummary)> = None;
                for score in &self.scores {
                    let s = score.cv.summaries()[m].1;
                    if !s.mean.is_finite() {
                        continue;
                    }
                    if best.map_or(true, |(_, b)| s.mean > b.mean) {
                        best = Some((score.model, s));
                    }
                }
                best.map(|(model, s)| MetricLeader {
                    metric: name.to_string(),
                    model,
                    mean: s.mean,
                    std: s.std,
                })
            })
            .collect()
    }
}

/// Cross-validate each model in `config.compare.models` on `ds`.
///
/// Fold count, seed and parallelism come from the `cv` and `split`
/// sections, so every model sees identical folds.
pub fn compare_models(ds: &Dataset, config: &PipelineConfig) -> Result<ModelComparison> {
    config.compare.validate()?;
    let k = config.cv.k_folds;
    let seed = config.split.seed;
    let parallel = config.cv.parallel;

    let mut scores = Vec::with_capacity(config.compare.models.len());
    for &model in &config.compare.models {
        let cv = match model {
            ModelKind::LogisticRegression => {
                let est = LogisticRegression::new(config.model.clone());
                cross_validate(&est, ds, k, seed, parallel)?
            }
            ModelKind::DecisionTree => {
                let est = DecisionTree::new(config.compare.tree.clone());
                cross_validate(&est, ds, k, seed, parallel)?
            }
            ModelKind::RandomForest => {
                let est = RandomForest::new(config.compare.forest.clone());
                cross_validate(&est, ds, k, seed, parallel)?
            }
        };
        obs::emit_model_compared(model.as_str(), k, cv.recall.mean, cv.recall.std);
        scores.push(ModelScore { model, cv });
    }

    Ok(ModelComparison {
        k,
        seed,
        rows: ds.n_rows(),
        scores,
    })
}

/// Load the configured CSV and compare. Smoke mode subsamples and caps the
/// fold count the same way a training run does.
pub fn run_comparison(config: &PipelineConfig) -> Result<ModelComparison> {
    config.validate()?;
    let loaded = load_csv(&config.data.path, &config.data)?;
    if !config.split.smoke {
        return compare_models(&loaded.dataset, config);
    }

    let subset = stratified_subsample(
        &loaded.dataset,
        config.split.smoke_fraction,
        config.split.seed,
    )?;
    let mut smoke = config.clone();
    smoke.cv.k_folds = smoke.cv.k_folds.min(SMOKE_K_FOLDS);
    compare_models(&subset, &smoke)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FoldMetrics;
    use crate::testing::{synthetic_dataset, to_csv};

    fn summary(mean: f64) -> MetricSummary {
        MetricSummary { mean, std: 0.01 }
    }

    fn scored(model: ModelKind, accuracy: f64, recall: f64) -> ModelScore {
        ModelScore {
            model,
            cv: CvSummary {
                k: 5,
                seed: 42,
                folds: Vec::<FoldMetrics>::new(),
                accuracy: summary(accuracy),
                precision: summary(0.9),
                recall: summary(recall),
                f1: summary(0.9),
            },
        }
    }

    fn small_config() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.cv.k_folds = 4;
        cfg.compare.forest.n_trees = 10;
        cfg
    }

    #[test]
    fn model_kind_parses_aliases() {
        assert_eq!("lr".parse::<ModelKind>().unwrap(), ModelKind::LogisticRegression);
        assert_eq!("decision-tree".parse::<ModelKind>().unwrap(), ModelKind::DecisionTree);
        assert_eq!("RF".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert!(matches!(
            "svm".parse::<ModelKind>(),
            Err(MlGateError::InvalidConfig(_))
        ));
        for kind in ModelKind::ALL {
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn every_requested_model_is_scored_on_the_same_folds() {
        let ds = synthetic_dataset(120, 0.4, 4);
        let cfg = small_config();
        let cmp = compare_models(&ds, &cfg).unwrap();

        let order: Vec<ModelKind> = cmp.scores.iter().map(|s| s.model).collect();
        assert_eq!(order, ModelKind::ALL.to_vec());
        assert_eq!(cmp.rows, 120);
        for score in &cmp.scores {
            assert_eq!(score.cv.k, 4);
            assert_eq!(score.cv.folds.len(), 4);
            let sizes: Vec<usize> = score
                .cv
                .folds
                .iter()
                .map(|f| f.positives + f.negatives)
                .collect();
            let lr_sizes: Vec<usize> = cmp.scores[0]
                .cv
                .folds
                .iter()
                .map(|f| f.positives + f.negatives)
                .collect();
            assert_eq!(sizes, lr_sizes);
        }

        let direct = cross_validate(&LogisticRegression::new(cfg.model.clone()), &ds, 4, 42, false)
            .unwrap();
        assert_eq!(cmp.score(ModelKind::LogisticRegression).unwrap().cv, direct);
    }

    #[test]
    fn subset_of_models_keeps_request_order() {
        let ds = synthetic_dataset(80, 0.4, 9);
        let mut cfg = small_config();
        cfg.compare.models = vec![ModelKind::RandomForest, ModelKind::LogisticRegression];
        let cmp = compare_models(&ds, &cfg).unwrap();
        assert_eq!(cmp.scores.len(), 2);
        assert_eq!(cmp.scores[0].model, ModelKind::RandomForest);
        assert!(cmp.score(ModelKind::DecisionTree).is_none());
    }

    #[test]
    fn best_per_metric_prefers_first_on_ties_and_skips_nan() {
        let cmp = ModelComparison {
            k: 5,
            seed: 42,
            rows: 100,
            scores: vec![
                scored(ModelKind::LogisticRegression, 0.95, f64::NAN),
                scored(ModelKind::DecisionTree, 0.97, 0.91),
                scored(ModelKind::RandomForest, 0.97, 0.93),
            ],
        };
        let leaders = cmp.best_per_metric();
        let names: Vec<&str> = leaders.iter().map(|l| l.metric.as_str()).collect();
        assert_eq!(names, vec!["accuracy", "precision", "recall", "f1"]);

        assert_eq!(leaders[0].model, ModelKind::DecisionTree);
        assert_eq!(leaders[1].model, ModelKind::LogisticRegression);
        assert_eq!(leaders[2].model, ModelKind::RandomForest);
        assert_eq!(leaders[2].mean, 0.93);
    }

    #[test]
    fn invalid_model_lists_rejected() {
        let ds = synthetic_dataset(40, 0.5, 1);
        let mut cfg = small_config();
        cfg.compare.models.clear();
        assert!(compare_models(&ds, &cfg).is_err());

        cfg.compare.models = vec![ModelKind::DecisionTree, ModelKind::DecisionTree];
        assert!(matches!(
            compare_models(&ds, &cfg),
            Err(MlGateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn smoke_comparison_caps_folds_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, to_csv(&synthetic_dataset(300, 0.4, 2))).unwrap();

        let mut cfg = small_config();
        cfg.data.path = path;
        cfg.cv.k_folds = 10;
        cfg.split.smoke = true;
        cfg.compare.models = vec![ModelKind::LogisticRegression, ModelKind::DecisionTree];

        let cmp = run_comparison(&cfg).unwrap();
        assert_eq!(cmp.k, SMOKE_K_FOLDS);
        assert_eq!(cmp.rows, 60);
        assert_eq!(cmp.scores.len(), 2);
    }
}
