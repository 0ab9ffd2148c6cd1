//! On-disk artifact store: CAS blobs, run records and the `CURRENT` pointer.
//!
//! Layout under the store root:
//!
//! ```text
//! objects/<2 hex>/<62 hex>   immutable model and promotion-metadata blobs
//! runs/<run_id>/run.json     one record per training run
//! runs/<run_id>/...          per-run reports
//! CURRENT                    pointer to the promoted metadata blob
//! ```
//!
//! `CURRENT` is the only mutable shared file. It is replaced by writing a
//! temp file in the same directory and renaming it over the old one, so a
//! reader sees either the previous pointer or the new one in full.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cas::fs::FsCasStore;
use crate::cas::Digest;
use crate::domain::{AggregateMetrics, MlGateError, Result, RunId, RunStatus};
use crate::gate::{PromotionThresholds, PromotionVerdict};
use crate::model::LogisticRegressionConfig;

const RUNS_DIR: &str = "runs";
const RUN_FILE: &str = "run.json";
const POINTER_FILE: &str = "CURRENT";

/// Write `bytes` to `path` via a temp file in the same directory + rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `value` as pretty JSON to `path` via temp file + rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, &serde_json::to_vec_pretty(value)?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Parameters a run was trained with, recorded for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub k_folds: usize,
    pub seed: u64,
    pub test_size: f64,
    pub smoke: bool,
    pub parallel: bool,
    pub model: LogisticRegressionConfig,
    pub thresholds: PromotionThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    pub rows: usize,
    pub features: usize,
    pub positives: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Persistent record of one training run.
///
/// Written as `Running` when the run starts and rewritten once with a
/// terminal status. Terminal records are never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub params: RunParams,
    pub data_source: String,
    /// SHA-256 of the dataset file.
    pub data_version: Digest,
    pub shape: Option<DatasetShape>,
    pub model_digest: Option<Digest>,
    pub metrics: Option<AggregateMetrics>,
    pub verdict: Option<PromotionVerdict>,
    /// Promotion metadata blob, set only for promoted runs.
    pub promotion: Option<Digest>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn start(run_id: RunId, params: RunParams, data_source: String, data_version: Digest) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            params,
            data_source,
            data_version,
            shape: None,
            model_digest: None,
            metrics: None,
            verdict: None,
            promotion: None,
            error: None,
        }
    }

    /// Move to a terminal status and stamp the completion time.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

/// The content of the `CURRENT` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    /// Digest of the promotion metadata blob.
    pub metadata: Digest,
    pub run_id: RunId,
    pub updated_at: DateTime<Utc>,
}

// Run ids become directory names.
fn valid_run_id(run_id: &RunId) -> bool {
    let s = run_id.as_str();
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Filesystem artifact store rooted at one directory.
pub struct ArtifactStore {
    root: PathBuf,
    cas: FsCasStore,
}

impl ArtifactStore {
    /// Open (creating if needed) the store at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(RUNS_DIR))?;
        let cas = FsCasStore::new(&root)?;
        Ok(Self { root, cas })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cas(&self) -> &FsCasStore {
        &self.cas
    }

    /// Directory holding the record and reports of `run_id`.
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(RUNS_DIR).join(run_id.as_str())
    }

    fn run_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(RUN_FILE)
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.root.join(POINTER_FILE)
    }

    /// Persist a new `Running` record. Fails if the run already exists.
    pub fn create_run(&self, record: &RunRecord) -> Result<()> {
        if !valid_run_id(&record.run_id) {
            return Err(MlGateError::InvalidConfig(format!(
                "invalid run id: {}",
                record.run_id
            )));
        }
        let path = self.run_path(&record.run_id);
        if path.exists() {
            return Err(MlGateError::RunFinalized(record.run_id.to_string()));
        }
        write_json_atomic(&path, record)?;
        debug!(run_id = %record.run_id, "run record created");
        Ok(())
    }

    /// Overwrite a run record that is still `Running`.
    pub fn update_run(&self, record: &RunRecord) -> Result<()> {
        let existing = self.run(&record.run_id)?;
        if existing.status.is_terminal() {
            return Err(MlGateError::RunFinalized(record.run_id.to_string()));
        }
        write_json_atomic(&self.run_path(&record.run_id), record)?;
        debug!(run_id = %record.run_id, status = ?record.status, "run record updated");
        Ok(())
    }

    /// Load one run record, including rejected and failed runs.
    pub fn run(&self, run_id: &RunId) -> Result<RunRecord> {
        if !valid_run_id(run_id) {
            return Err(MlGateError::RunNotFound(run_id.to_string()));
        }
        let path = self.run_path(run_id);
        if !path.exists() {
            return Err(MlGateError::RunNotFound(run_id.to_string()));
        }
        read_json(&path)
    }

    /// Every run record, oldest first.
    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(self.root.join(RUNS_DIR))? {
            let path = entry?.path().join(RUN_FILE);
            if path.is_file() {
                records.push(read_json::<RunRecord>(&path)?);
            }
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(records)
    }

    /// The current pointer, or `None` before the first promotion.
    pub fn read_pointer(&self) -> Result<Option<CurrentPointer>> {
        match fs::read(self.pointer_path()) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace `CURRENT`.
    pub(crate) fn write_pointer(&self, pointer: &CurrentPointer) -> Result<()> {
        write_json_atomic(&self.pointer_path(), pointer)?;
        debug!(
            run_id = %pointer.run_id,
            metadata = %pointer.metadata.short(),
            "CURRENT replaced"
        );
        Ok(())
    }
}
