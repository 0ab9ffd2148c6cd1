//! In-memory tabular dataset: named numeric features plus a binary label.

use serde::{Deserialize, Serialize};

use super::error::{DataError, Result};

/// Binary class label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Benign (encoded as 0).
    Negative,
    /// Malignant (encoded as 1).
    Positive,
}

impl Label {
    /// Numeric encoding used by the estimator (0 or 1).
    pub fn as_u8(self) -> u8 {
        match self {
            Label::Negative => 0,
            Label::Positive => 1,
        }
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Label::Positive)
    }

    /// Human-readable diagnosis name.
    pub fn display_name(self) -> &'static str {
        match self {
            Label::Negative => "Benign",
            Label::Positive => "Malignant",
        }
    }
}

/// Ordered table of rows. Features are stored row-major in one buffer.
///
/// # Invariants
///
/// `features.len() == labels.len() * feature_names.len()`; every row has the
/// same feature set. Constructors enforce this.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Vec<f64>,
    labels: Vec<Label>,
}

impl Dataset {
    /// Build a dataset from per-row feature vectors.
    pub fn from_rows(
        feature_names: Vec<String>,
        rows: Vec<Vec<f64>>,
        labels: Vec<Label>,
    ) -> Result<Self> {
        let n_features = feature_names.len();
        if rows.len() != labels.len() {
            return Err(DataError::RaggedRow {
                row: rows.len().min(labels.len()),
                expected: rows.len(),
                found: labels.len(),
            }
            .into());
        }
        let mut features = Vec::with_capacity(rows.len() * n_features);
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != n_features {
                return Err(DataError::RaggedRow {
                    row: idx,
                    expected: n_features,
                    found: row.len(),
                }
                .into());
            }
            features.extend(row);
        }
        Ok(Self {
            feature_names,
            features,
            labels,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature values of row `idx`.
    pub fn row(&self, idx: usize) -> &[f64] {
        let width = self.n_features();
        &self.features[idx * width..(idx + 1) * width]
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn rows(&self) -> impl Iterator<Item = (&[f64], Label)> + '_ {
        (0..self.n_rows()).map(move |i| (self.row(i), self.labels[i]))
    }

    /// Number of positive rows.
    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|l| l.is_positive()).count()
    }

    /// Row indices grouped by class: `(negatives, positives)`, each in row order.
    pub fn class_indices(&self) -> (Vec<usize>, Vec<usize>) {
        let mut negatives = Vec::new();
        let mut positives = Vec::new();
        for (idx, label) in self.labels.iter().enumerate() {
            match label {
                Label::Negative => negatives.push(idx),
                Label::Positive => positives.push(idx),
            }
        }
        (negatives, positives)
    }

    /// Copy the given rows (in the given order) into a new dataset.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let width = self.n_features();
        let mut features = Vec::with_capacity(indices.len() * width);
        let mut labels = Vec::with_capacity(indices.len());
        for &idx in indices {
            features.extend_from_slice(self.row(idx));
            labels.push(self.labels[idx]);
        }
        Self {
            feature_names: self.feature_names.clone(),
            features,
            labels,
        }
    }
}
