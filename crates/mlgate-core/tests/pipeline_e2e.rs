//! End-to-end: CSV on disk -> training run -> reports -> prediction.

use mlgate_core::reporting::{CLASSIFICATION_REPORT_FILE, RUN_SUMMARY_FILE};
use mlgate_core::testing::{synthetic_dataset, to_csv, SYNTHETIC_FEATURES};
use mlgate_core::{
    ArtifactStore, DataError, MlGateError, PipelineConfig, Predictor, RunStatus,
    TrainingPipeline,
};

fn write_fixture(dir: &std::path::Path, rows: usize) -> PipelineConfig {
    let csv_path = dir.join("breast-cancer.csv");
    std::fs::write(&csv_path, to_csv(&synthetic_dataset(rows, 0.37, 42))).unwrap();

    let mut cfg = PipelineConfig::default();
    cfg.data.path = csv_path;
    cfg.store.root = dir.join("store");
    cfg.thresholds.min_recall = 0.6;
    cfg.thresholds.max_recall_std = 0.3;
    cfg
}

#[test]
fn csv_to_promoted_model() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_fixture(dir.path(), 300);
    let store_root = cfg.store.root.clone();

    let outcome = TrainingPipeline::new(cfg).unwrap().run().unwrap();
    assert_eq!(outcome.status, RunStatus::Promoted);
    assert_eq!(outcome.verdict.metrics.cv.k, 10);
    assert_eq!(outcome.verdict.metrics.cv.folds.len(), 10);

    let store = ArtifactStore::open(&store_root).unwrap();
    let run_dir = store.run_dir(&outcome.run_id);
    assert!(run_dir.join(RUN_SUMMARY_FILE).is_file());
    assert!(run_dir.join(CLASSIFICATION_REPORT_FILE).is_file());

    let summary: serde_json::Value =
        serde_json::from_slice(&std::fs::read(run_dir.join(RUN_SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(summary["status"], "promoted");
    assert_eq!(summary["gate"]["promote"], true);

    let record = store.run(&outcome.run_id).unwrap();
    let shape = record.shape.unwrap();
    assert_eq!(shape.rows, 300);
    assert_eq!(shape.features, SYNTHETIC_FEATURES);
    assert_eq!(shape.train_rows + shape.test_rows, 300);

    let predictor = Predictor::load(&store).unwrap();
    assert_eq!(predictor.run_id(), &outcome.run_id);
    let p = predictor.predict(&[16.0, 32.0, 0.0, 5.0]).unwrap();
    assert_eq!(p.label, "Malignant");
}

#[test]
fn identical_inputs_give_identical_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_fixture(dir.path(), 150);

    let a = TrainingPipeline::new(cfg.clone()).unwrap().run().unwrap();
    let b = TrainingPipeline::new(cfg).unwrap().run().unwrap();
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.verdict.metrics, b.verdict.metrics);
    assert_eq!(a.model_digest, b.model_digest);
}

#[test]
fn data_errors_abort_before_a_run_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bad.csv");
    std::fs::write(&csv_path, "id,diagnosis,radius_mean\n1,M,1.0\n2,B,\n").unwrap();

    let mut cfg = PipelineConfig::default();
    cfg.data.path = csv_path;
    cfg.store.root = dir.path().join("store");

    let err = TrainingPipeline::new(cfg).unwrap().run().unwrap_err();
    assert!(matches!(
        err,
        MlGateError::Data(DataError::MissingValue { row: 2, .. })
    ));
    assert!(!dir.path().join("store").exists());
}

#[test]
fn parallel_folds_match_sequential_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_fixture(dir.path(), 200);
    let mut parallel = cfg.clone();
    parallel.cv.parallel = true;

    let seq = TrainingPipeline::new(cfg).unwrap().run().unwrap();
    let par = TrainingPipeline::new(parallel).unwrap().run().unwrap();
    assert_eq!(seq.verdict.metrics, par.verdict.metrics);
}
