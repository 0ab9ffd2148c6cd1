//! Pipeline configuration.
//!
//! Values come from [`PipelineConfig::default`], optionally overlaid by a
//! TOML file, and finally by CLI flags / environment variables in the binary.
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! overrides:
//!
//! ```toml
//! [cv]
//! k_folds = 5
//!
//! [thresholds]
//! min_recall = 0.97
//!
//! [compare]
//! models = ["logistic_regression", "random_forest"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compare::CompareConfig;
use crate::domain::{MlGateError, Result};
use crate::gate::PromotionThresholds;
use crate::model::LogisticRegressionConfig;

/// Where the dataset lives and how to interpret its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: PathBuf,
    pub target_column: String,
    pub drop_columns: Vec<String>,
    pub positive_label: String,
    pub negative_label: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/breast-cancer.csv"),
            target_column: "diagnosis".to_string(),
            drop_columns: vec!["id".to_string()],
            positive_label: "M".to_string(),
            negative_label: "B".to_string(),
        }
    }
}

/// Held-out split and optional smoke-test subsampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
    /// Train on a stratified subsample for quick checks.
    pub smoke: bool,
    pub smoke_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            smoke: false,
            smoke_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    pub k_folds: usize,
    /// Evaluate folds on the rayon pool.
    pub parallel: bool,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            k_folds: 10,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".mlgate"),
        }
    }
}

/// Full configuration for one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub cv: CvConfig,
    pub model: LogisticRegressionConfig,
    pub thresholds: PromotionThresholds,
    pub store: StoreConfig,
    /// Models scored by `compare`; training always uses `model`.
    pub compare: CompareConfig,
}

impl PipelineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MlGateError::InvalidConfig(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MlGateError::InvalidConfig(msg));

        if self.cv.k_folds < 2 {
            return invalid(format!("k_folds must be >= 2, got {}", self.cv.k_folds));
        }
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return invalid(format!(
                "test_size must be in (0, 1), got {}",
                self.split.test_size
            ));
        }
        if !(self.split.smoke_fraction > 0.0 && self.split.smoke_fraction <= 1.0) {
            return invalid(format!(
                "smoke_fraction must be in (0, 1], got {}",
                self.split.smoke_fraction
            ));
        }
        if self.data.positive_label == self.data.negative_label {
            return invalid("positive and negative labels must differ".to_string());
        }
        self.model.validate()?;
        self.thresholds.validate()?;
        self.compare.validate()?;
        Ok(())
    }
}
