//! Per-run report artifacts: `run_summary.json` and
//! `classification_report.txt`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cas::Digest;
use crate::compare::ModelComparison;
use crate::domain::{ConfusionMatrix, CvSummary, RunStatus, TestMetrics};
use crate::gate::{PromotionThresholds, Violation};
use crate::scoring::metrics_from_confusion;
use crate::store::{write_atomic, write_json_atomic, DatasetShape, RunParams, RunRecord};

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";
pub const CLASSIFICATION_REPORT_FILE: &str = "classification_report.txt";

/// Gate section of the run summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateSummaryArtifact {
    pub promote: bool,
    pub thresholds: PromotionThresholds,
    pub violations: Vec<Violation>,
}

/// Machine-readable summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummaryArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub status: RunStatus,
    pub data_source: String,
    pub data_version: Digest,
    pub shape: Option<DatasetShape>,
    pub params: RunParams,
    pub cv: Option<CvSummary>,
    pub test: Option<TestMetrics>,
    pub gate: Option<GateSummaryArtifact>,
    pub model_digest: Option<Digest>,
    pub promotion: Option<Digest>,
}

impl RunSummaryArtifact {
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            schema_version: "1.0".to_string(),
            generated_at: Utc::now(),
            run_id: record.run_id.to_string(),
            status: record.status,
            data_source: record.data_source.clone(),
            data_version: record.data_version,
            shape: record.shape,
            params: record.params.clone(),
            cv: record.metrics.as_ref().map(|m| m.cv.clone()),
            test: record.metrics.as_ref().map(|m| m.test.clone()),
            gate: record.verdict.as_ref().map(|v| GateSummaryArtifact {
                promote: v.promote,
                thresholds: v.thresholds.clone(),
                violations: v.violations.clone(),
            }),
            model_digest: record.model_digest,
            promotion: record.promotion,
        }
    }
}

/// Write run_summary.json in pretty JSON format.
pub fn write_run_summary_json(path: &Path, artifact: &RunSummaryArtifact) -> Result<()> {
    write_json_atomic(path, artifact).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

struct ClassRow {
    name: &'static str,
    precision: f64,
    recall: f64,
    f1: f64,
    support: usize,
}

impl ClassRow {
    /// Scores for the class counted as positive in `cm`.
    fn new(name: &'static str, cm: &ConfusionMatrix) -> Self {
        let m = metrics_from_confusion(cm);
        Self {
            name,
            precision: m.precision,
            recall: m.recall,
            f1: m.f1,
            support: cm.actual_positive(),
        }
    }
}

/// `cm` with the roles of the two classes exchanged.
fn swap_classes(cm: &ConfusionMatrix) -> ConfusionMatrix {
    ConfusionMatrix {
        true_positive: cm.true_negative,
        false_positive: cm.false_negative,
        true_negative: cm.true_positive,
        false_negative: cm.false_positive,
    }
}

/// Per-class precision/recall/f1 table for the held-out split.
pub fn render_classification_report(cm: &ConfusionMatrix) -> String {
    let rows = [
        ClassRow::new("Benign", &swap_classes(cm)),
        ClassRow::new("Malignant", cm),
    ];
    let total = cm.total();
    let accuracy = metrics_from_confusion(cm).accuracy;

    let mut out = String::new();
    out.push_str(&format!(
        "{:>12} {:>9} {:>9} {:>9} {:>9}\n\n",
        "", "precision", "recall", "f1-score", "support"
    ));
    for r in &rows {
        out.push_str(&format!(
            "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
            r.name, r.precision, r.recall, r.f1, r.support
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "{:>12} {:>9} {:>9} {:>9.4} {:>9}\n",
        "accuracy", "", "", accuracy, total
    ));

    let macro_avg = |f: fn(&ClassRow) -> f64| rows.iter().map(f).sum::<f64>() / rows.len() as f64;
    out.push_str(&format!(
        "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
        "macro avg",
        macro_avg(|r| r.precision),
        macro_avg(|r| r.recall),
        macro_avg(|r| r.f1),
        total
    ));

    let weighted = |f: fn(&ClassRow) -> f64| {
        rows.iter().map(|r| f(r) * r.support as f64).sum::<f64>() / total.max(1) as f64
    };
    out.push_str(&format!(
        "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
        "weighted avg",
        weighted(|r| r.precision),
        weighted(|r| r.recall),
        weighted(|r| r.f1),
        total
    ));
    out
}

pub fn write_classification_report(path: &Path, cm: &ConfusionMatrix) -> Result<()> {
    let text = render_classification_report(cm);
    write_atomic(path, text.as_bytes()).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Per-model CV table (mean ± std), then the leading model for each metric.
pub fn render_model_comparison(cmp: &ModelComparison) -> String {
    let mut out = format!(
        "{}-fold cross-validation on {} rows (seed {})\n\n",
        cmp.k, cmp.rows, cmp.seed
    );
    out.push_str(&format!(
        "{:<22} {:>17} {:>17} {:>17} {:>17}\n",
        "Model", "Accuracy", "Precision", "Recall", "F1-Score"
    ));
    out.push_str(&"-".repeat(22 + 4 * 18));
    out.push('\n');
    for score in &cmp.scores {
        out.push_str(&format!("{:<22}", score.model.display_name()));
        for (_, s) in score.cv.summaries() {
            out.push_str(&format!(" {:>17}", format!("{:.4} ± {:.4}", s.mean, s.std)));
        }
        out.push('\n');
    }

    out.push_str("\nBest per metric (mean over folds)\n");
    for leader in cmp.best_per_metric() {
        out.push_str(&format!(
            "  {:<10} {} ({:.4} ± {:.4})\n",
            leader.metric,
            leader.model.display_name(),
            leader.mean,
            leader.std
        ));
    }
    out
}

/// Write a comparison as pretty JSON.
pub fn write_comparison_json(path: &Path, cmp: &ModelComparison) -> Result<()> {
    write_json_atomic(path, cmp).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write every report for `record` into `dir`. Returns the written paths.
pub fn write_run_reports(dir: &Path, record: &RunRecord) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let mut written = Vec::new();

    let summary_path = dir.join(RUN_SUMMARY_FILE);
    write_run_summary_json(&summary_path, &RunSummaryArtifact::from_record(record))?;
    written.push(summary_path);

    if let Some(metrics) = &record.metrics {
        let report_path = dir.join(CLASSIFICATION_REPORT_FILE);
        write_classification_report(&report_path, &metrics.test.confusion)?;
        written.push(report_path);
    }
    Ok(written)
}
