//! End-to-end training run: load, split, cross-validate, evaluate, gate,
//! and conditionally promote.

use std::path::PathBuf;
use std::time::Instant;

use tracing::warn;

use crate::cas::Digest;
use crate::config::PipelineConfig;
use crate::data::{load_csv, stratified_subsample, LoadedDataset};
use crate::domain::{MlGateError, Result, RunId, RunStatus};
use crate::gate::{decide, GateRuleSet, PromotionVerdict};
use crate::metrics::METRICS;
use crate::model::LogisticRegression;
use crate::obs::{self, RunSpan};
use crate::promote::Promotion;
use crate::reporting;
use crate::store::{ArtifactStore, DatasetShape, RunParams, RunRecord};
use crate::trainer::{train_and_evaluate, TrainingPlan};

/// Fold count used in smoke mode when the configured count is larger.
pub const SMOKE_K_FOLDS: usize = 3;

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub model_digest: Digest,
    pub verdict: PromotionVerdict,
    /// Set when the model became current.
    pub promotion: Option<Promotion>,
    pub reports: Vec<PathBuf>,
}

impl PipelineOutcome {
    pub fn promoted(&self) -> bool {
        self.status == RunStatus::Promoted
    }
}

pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    /// Validates `config` up front.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn k_folds(&self) -> usize {
        if self.config.split.smoke {
            self.config.cv.k_folds.min(SMOKE_K_FOLDS)
        } else {
            self.config.cv.k_folds
        }
    }

    fn params(&self) -> RunParams {
        RunParams {
            k_folds: self.k_folds(),
            seed: self.config.split.seed,
            test_size: self.config.split.test_size,
            smoke: self.config.split.smoke,
            parallel: self.config.cv.parallel,
            model: self.config.model.clone(),
            thresholds: self.config.thresholds.clone(),
        }
    }

    /// Load the configured CSV and run.
    ///
    /// Data errors abort before a run record is created.
    pub fn run(&self) -> Result<PipelineOutcome> {
        let loaded = load_csv(&self.config.data.path, &self.config.data)?;
        self.run_with_dataset(loaded)
    }

    /// Run on an already loaded dataset.
    pub fn run_with_dataset(&self, loaded: LoadedDataset) -> Result<PipelineOutcome> {
        let store = ArtifactStore::open(&self.config.store.root)?;
        let run_id = RunId::new();
        let _span = RunSpan::enter(run_id.as_str());
        let started = Instant::now();
        METRICS.inc_runs_started();

        let mut record = RunRecord::start(
            run_id.clone(),
            self.params(),
            loaded.source.display().to_string(),
            loaded.fingerprint,
        );
        store.create_run(&record)?;
        obs::emit_run_started(
            run_id.as_str(),
            loaded.dataset.n_rows(),
            loaded.dataset.n_features(),
            self.k_folds(),
        );

        let result = self.execute(&store, &mut record, loaded);
        let status = match &result {
            Ok(promotion) if promotion.is_some() => RunStatus::Promoted,
            Ok(_) => RunStatus::Rejected,
            Err(_) => RunStatus::Failed,
        };
        if let Err(e) = &result {
            record.error = Some(e.to_string());
        }
        record.finish(status);

        let finalized = self.finalize(&store, &record);
        obs::emit_run_finished(
            run_id.as_str(),
            started.elapsed().as_millis() as u64,
            status,
        );
        METRICS.flush();

        // A training error is the root cause; report it ahead of a failed
        // terminal write.
        let promotion = result?;
        let reports = finalized?;
        let (Some(model_digest), Some(verdict)) = (record.model_digest, record.verdict) else {
            return Err(MlGateError::Training(
                "run finished without a model or verdict".to_string(),
            ));
        };
        Ok(PipelineOutcome {
            run_id,
            status,
            model_digest,
            verdict,
            promotion,
            reports,
        })
    }

    /// Train, gate and promote. Fills `record` as results arrive.
    fn execute(
        &self,
        store: &ArtifactStore,
        record: &mut RunRecord,
        loaded: LoadedDataset,
    ) -> Result<Option<Promotion>> {
        let dataset = if self.config.split.smoke {
            stratified_subsample(
                &loaded.dataset,
                self.config.split.smoke_fraction,
                self.config.split.seed,
            )?
        } else {
            loaded.dataset
        };

        let estimator = LogisticRegression::new(self.config.model.clone());
        let plan = TrainingPlan {
            test_size: self.config.split.test_size,
            k_folds: self.k_folds(),
            seed: self.config.split.seed,
            parallel: self.config.cv.parallel,
        };
        let trained = train_and_evaluate(&estimator, &dataset, &plan)?;

        record.shape = Some(DatasetShape {
            rows: dataset.n_rows(),
            features: dataset.n_features(),
            positives: dataset.n_positive(),
            train_rows: trained.train_rows,
            test_rows: trained.test_rows,
        });
        let model_digest = store.put_model(&trained.model)?;
        record.model_digest = Some(model_digest);
        record.metrics = Some(trained.metrics.clone());

        let rules = GateRuleSet::standard().with_thresholds(self.config.thresholds.clone());
        let verdict = decide(&rules, trained.metrics);
        obs::emit_gate_evaluated(
            record.run_id.as_str(),
            verdict.metrics.cv.recall.mean,
            verdict.metrics.cv.recall.std,
            verdict.promote,
        );
        record.verdict = Some(verdict.clone());

        if !verdict.promote {
            METRICS.inc_rejections();
            for v in &verdict.violations {
                tracing::info!(event = "gate.violation", rule = ?v.rule, reason = %v.reason);
            }
            return Ok(None);
        }

        let promotion =
            store.promote(&record.run_id, &model_digest, &record.data_version, &verdict)?;
        record.promotion = Some(promotion.digest);
        METRICS.inc_promotions();
        Ok(Some(promotion))
    }

    /// Persist the terminal record, then the reports.
    ///
    /// A record that cannot be written is an error: the run would otherwise
    /// stay `Running` on disk with none of its results. Report failures are
    /// only logged, since the reports are derived from the record.
    fn finalize(&self, store: &ArtifactStore, record: &RunRecord) -> Result<Vec<PathBuf>> {
        if let Err(e) = store.update_run(record) {
            obs::emit_run_finalize_error(record.run_id.as_str(), &e);
            return Err(e);
        }
        match reporting::write_run_reports(&store.run_dir(&record.run_id), record) {
            Ok(paths) => Ok(paths),
            Err(e) => {
                warn!(event = "report.write_failed", run_id = %record.run_id, error = %e);
                Ok(Vec::new())
            }
        }
    }
}
