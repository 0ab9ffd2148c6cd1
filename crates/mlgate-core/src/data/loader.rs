//! CSV dataset loading with content fingerprinting.
//!
//! The loader is strict: a missing value, a non-numeric feature or an
//! unknown label aborts the load with the offending row and column. Nothing
//! downstream has to cope with partial rows.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::cas::Digest;
use crate::config::DataConfig;
use crate::domain::{DataError, Dataset, Label, Result};

/// A dataset together with where it came from and a fingerprint of its bytes.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    /// SHA-256 of the raw file, used as the data version.
    pub fingerprint: Digest,
    pub source: PathBuf,
}

/// Read and parse the CSV file at `path`.
pub fn load_csv(path: &Path, cfg: &DataConfig) -> Result<LoadedDataset> {
    let bytes = std::fs::read(path)?;
    let fingerprint = Digest::compute(&bytes);
    let dataset = parse_csv(&bytes, cfg)?;

    info!(
        event = "data.loaded",
        path = %path.display(),
        rows = dataset.n_rows(),
        features = dataset.n_features(),
        positives = dataset.n_positive(),
        data_version = %fingerprint.short(),
    );

    Ok(LoadedDataset {
        dataset,
        fingerprint,
        source: path.to_path_buf(),
    })
}

/// Parse CSV bytes into a [`Dataset`].
///
/// Columns listed in `cfg.drop_columns` and columns with an empty header are
/// ignored. Every other non-target column is a numeric feature.
pub fn parse_csv(bytes: &[u8], cfg: &DataConfig) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers().map_err(DataError::from)?.clone();
    let target_idx = headers
        .iter()
        .position(|h| h == cfg.target_column)
        .ok_or_else(|| DataError::MissingColumn {
            column: cfg.target_column.clone(),
        })?;

    let feature_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            *idx != target_idx
                && !name.is_empty()
                && !cfg.drop_columns.iter().any(|d| d == name)
        })
        .map(|(idx, name)| (idx, name.to_string()))
        .collect();

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(DataError::from)?;
        let row_no = idx + 1;
        if record.len() != headers.len() {
            return Err(DataError::RaggedRow {
                row: row_no,
                expected: headers.len(),
                found: record.len(),
            }
            .into());
        }

        let raw_label = &record[target_idx];
        let label = if raw_label == cfg.positive_label {
            Label::Positive
        } else if raw_label == cfg.negative_label {
            Label::Negative
        } else {
            return Err(DataError::UnknownLabel {
                row: row_no,
                value: raw_label.to_string(),
            }
            .into());
        };

        let mut row = Vec::with_capacity(feature_cols.len());
        for (col, name) in &feature_cols {
            let raw = &record[*col];
            if raw.is_empty() {
                return Err(DataError::MissingValue {
                    row: row_no,
                    column: name.clone(),
                }
                .into());
            }
            let value: f64 = raw.parse().map_err(|_| DataError::NotNumeric {
                row: row_no,
                column: name.clone(),
                value: raw.to_string(),
            })?;
            if !value.is_finite() {
                return Err(DataError::NotNumeric {
                    row: row_no,
                    column: name.clone(),
                    value: raw.to_string(),
                }
                .into());
            }
            row.push(value);
        }
        rows.push(row);
        labels.push(label);
    }

    if rows.is_empty() {
        return Err(DataError::Empty.into());
    }
    if labels.iter().all(|l| l.is_positive()) {
        return Err(DataError::SingleClass("positive").into());
    }
    if labels.iter().all(|l| !l.is_positive()) {
        return Err(DataError::SingleClass("negative").into());
    }

    let names = feature_cols.into_iter().map(|(_, name)| name).collect();
    Dataset::from_rows(names, rows, labels)
}
