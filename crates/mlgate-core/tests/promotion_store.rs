//! Promotion pointer semantics: swaps, rejections, rollback and concurrent
//! readers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mlgate_core::testing::synthetic_dataset;
use mlgate_core::{
    decide, AggregateMetrics, ArtifactStore, ConfusionMatrix, CvSummary, Dataset, Digest,
    Estimator, GateRuleSet, Label, LoadedDataset, LogisticRegression, MetricSummary,
    MlGateError, PipelineConfig, Predictor, RunId, RunStatus, TestMetrics, TrainingPipeline,
};

fn passing_metrics() -> AggregateMetrics {
    let s = MetricSummary {
        mean: 0.97,
        std: 0.02,
    };
    AggregateMetrics {
        cv: CvSummary {
            k: 10,
            seed: 42,
            folds: Vec::new(),
            accuracy: s,
            precision: s,
            recall: s,
            f1: s,
        },
        test: TestMetrics {
            accuracy: 0.96,
            precision: 0.95,
            recall: 0.95,
            f1: 0.95,
            roc_auc: 0.99,
            confusion: ConfusionMatrix::default(),
        },
    }
}

fn store_model(store: &ArtifactStore, seed: u64) -> Digest {
    let model = LogisticRegression::default()
        .fit(&synthetic_dataset(60, 0.4, seed))
        .unwrap();
    store.put_model(&model).unwrap()
}

fn promote(store: &ArtifactStore, run: &str, model: &Digest) {
    let verdict = decide(&GateRuleSet::standard(), passing_metrics());
    store
        .promote(&RunId::from(run), model, &Digest::compute(b"data"), &verdict)
        .unwrap();
}

fn lenient_config(root: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.store.root = root.to_path_buf();
    cfg.cv.k_folds = 5;
    cfg.thresholds.min_recall = 0.5;
    cfg.thresholds.max_recall_std = 0.5;
    cfg
}

fn loaded(dataset: Dataset) -> LoadedDataset {
    LoadedDataset {
        dataset,
        fingerprint: Digest::compute(b"fixture"),
        source: PathBuf::from("fixture.csv"),
    }
}

fn uninformative_dataset() -> Dataset {
    let rows = (0..200)
        .map(|i| vec![((i * 7919) % 97) as f64, ((i * 31) % 13) as f64])
        .collect();
    let labels = (0..200)
        .map(|i| if i % 2 == 0 { Label::Positive } else { Label::Negative })
        .collect();
    Dataset::from_rows(vec!["a".into(), "b".into()], rows, labels).unwrap()
}

#[test]
fn promotion_updates_current_and_keeps_previous_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let m1 = store_model(&store, 1);
    let m2 = store_model(&store, 2);

    promote(&store, "run-1", &m1);
    let first = store.current().unwrap().unwrap();

    promote(&store, "run-2", &m2);
    let pointer = store.read_pointer().unwrap().unwrap();
    assert_eq!(pointer.run_id, RunId::from("run-2"));

    let current = store.current().unwrap().unwrap();
    assert_eq!(current.metadata.run_id, pointer.run_id);
    assert_eq!(current.metadata.model_digest, m2);
    assert_eq!(current.metadata.previous, Some(first.digest));

    // previous metadata and model are still in the store
    let history = store.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].metadata.model_digest, m1);
    assert!(store.model(&m1).is_ok());
}

#[test]
fn rejected_run_leaves_current_byte_identical() {
    let dir = tempfile::tempdir().unwrap();

    let promoted = TrainingPipeline::new(lenient_config(dir.path()))
        .unwrap()
        .run_with_dataset(loaded(synthetic_dataset(200, 0.4, 3)))
        .unwrap();
    assert!(promoted.promoted());

    let store = ArtifactStore::open(dir.path()).unwrap();
    let before = std::fs::read(store.pointer_path()).unwrap();

    let mut strict = lenient_config(dir.path());
    strict.thresholds.min_recall = 0.95;
    strict.thresholds.max_recall_std = 0.05;
    let rejected = TrainingPipeline::new(strict)
        .unwrap()
        .run_with_dataset(loaded(uninformative_dataset()))
        .unwrap();
    assert_eq!(rejected.status, RunStatus::Rejected);

    let after = std::fs::read(store.pointer_path()).unwrap();
    assert_eq!(before, after);

    // the rejected run is still on record
    let rec = store.run(&rejected.run_id).unwrap();
    assert_eq!(rec.status, RunStatus::Rejected);
    assert!(rec.promotion.is_none());
    assert!(rec.verdict.is_some());
}

#[test]
fn promotion_io_failure_marks_run_failed() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    // A directory where the pointer file should be makes the swap fail.
    std::fs::create_dir(store.pointer_path()).unwrap();

    let err = TrainingPipeline::new(lenient_config(dir.path()))
        .unwrap()
        .run_with_dataset(loaded(synthetic_dataset(200, 0.4, 3)))
        .unwrap_err();
    assert!(matches!(err, MlGateError::Io(_)));

    let runs = store.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].promotion.is_none());
    assert!(runs[0].model_digest.is_some());
    assert!(store.pointer_path().is_dir());
}

#[test]
fn rollback_then_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let m1 = store_model(&store, 1);
    let m2 = store_model(&store, 2);
    let m3 = store_model(&store, 3);
    promote(&store, "run-1", &m1);
    promote(&store, "run-2", &m2);
    promote(&store, "run-3", &m3);

    let restored = store.rollback().unwrap();
    assert_eq!(restored.metadata.run_id, RunId::from("run-2"));
    assert_eq!(Predictor::load(&store).unwrap().run_id(), &RunId::from("run-2"));

    let ids: Vec<String> = store
        .history()
        .unwrap()
        .into_iter()
        .map(|p| p.metadata.run_id.0)
        .collect();
    assert_eq!(ids, vec!["run-2", "run-1"]);

    store.rollback().unwrap();
    assert!(matches!(
        store.rollback(),
        Err(MlGateError::RollbackUnavailable(_))
    ));
}

#[test]
fn concurrent_readers_never_see_a_mixed_pair() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ArtifactStore::open(dir.path()).unwrap());

    let expected: HashMap<RunId, Digest> = (0..8u64)
        .map(|i| (RunId(format!("run-{i}")), store_model(&store, i + 10)))
        .collect();
    let expected = Arc::new(expected);
    promote(&store, "run-0", &expected[&RunId::from("run-0")]);

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let expected = Arc::clone(&expected);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0;
                while !done.load(Ordering::Acquire) || reads == 0 {
                    let current = store.current().expect("consistent pointer").expect("promoted");
                    assert_eq!(
                        expected[&current.metadata.run_id],
                        current.metadata.model_digest,
                        "metadata for {} names the wrong model",
                        current.metadata.run_id
                    );
                    let predictor = Predictor::load(&store).expect("loadable model");
                    assert!(expected.contains_key(predictor.run_id()));
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for round in 0..5 {
        for i in 1..8 {
            let run = format!("run-{i}");
            let digest = expected[&RunId(run.clone())];
            let verdict = decide(&GateRuleSet::standard(), passing_metrics());
            store
                .promote(
                    &RunId(run),
                    &digest,
                    &Digest::compute(format!("data-{round}").as_bytes()),
                    &verdict,
                )
                .unwrap();
        }
    }
    done.store(true, Ordering::Release);

    for r in readers {
        assert!(r.join().unwrap() > 0);
    }
}
