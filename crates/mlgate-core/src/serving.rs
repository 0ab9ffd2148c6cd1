//! Prediction against the currently promoted model.

use serde::{Deserialize, Serialize};

use crate::cas::Digest;
use crate::domain::{MlGateError, Result, RunId};
use crate::metrics::METRICS;
use crate::model::{Classifier, LogisticModel};
use crate::scoring;
use crate::store::ArtifactStore;

/// Coarse certainty band of a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// `high` at p >= 0.8 or p <= 0.2, `medium` at p >= 0.6 or p <= 0.4,
    /// otherwise `low`.
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.8 || p <= 0.2 {
            Confidence::High
        } else if p >= 0.6 || p <= 0.4 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1 for malignant, 0 for benign.
    pub class: u8,
    pub label: String,
    /// Probability of the malignant class.
    pub probability: f64,
    pub confidence: Confidence,
    pub model_run_id: RunId,
}

/// A loaded, verified snapshot of the promoted model.
///
/// Resolution reads `CURRENT` once; later promotions do not affect an
/// already loaded predictor.
#[derive(Debug, Clone)]
pub struct Predictor {
    run_id: RunId,
    metadata_digest: Digest,
    model: LogisticModel,
}

impl Predictor {
    /// Resolve `CURRENT` to a metadata blob and then to its model blob.
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        let promotion = store.current()?.ok_or(MlGateError::NoPromotedModel)?;
        // Blob reads are digest-verified; a corrupt model fails here.
        let model = store.model(&promotion.metadata.model_digest)?;
        Ok(Self {
            run_id: promotion.metadata.run_id,
            metadata_digest: promotion.digest,
            model,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn metadata_digest(&self) -> &Digest {
        &self.metadata_digest
    }

    pub fn feature_names(&self) -> &[String] {
        &self.model.feature_names
    }

    pub fn predict(&self, features: &[f64]) -> Result<Prediction> {
        self.model.check_features(features)?;
        if let Some(pos) = features.iter().position(|v| !v.is_finite()) {
            return Err(MlGateError::InvalidConfig(format!(
                "feature {} ({}) is not a finite number",
                pos, self.model.feature_names[pos]
            )));
        }

        let probability = self.model.predict_proba_row(features);
        let label = scoring::classify(probability);
        METRICS.inc_predictions();

        Ok(Prediction {
            class: label.as_u8(),
            label: label.display_name().to_string(),
            probability,
            confidence: Confidence::from_probability(probability),
            model_run_id: self.run_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{decide, GateRuleSet};
    use crate::domain::{AggregateMetrics, ConfusionMatrix, CvSummary, MetricSummary, TestMetrics};
    use crate::model::{Estimator, LogisticRegression};
    use crate::testing::synthetic_dataset;

    fn passing_metrics() -> AggregateMetrics {
        let s = MetricSummary {
            mean: 0.98,
            std: 0.01,
        };
        AggregateMetrics {
            cv: CvSummary {
                k: 5,
                seed: 1,
                folds: Vec::new(),
                accuracy: s,
                precision: s,
                recall: s,
                f1: s,
            },
            test: TestMetrics {
                accuracy: 0.98,
                precision: 0.98,
                recall: 0.98,
                f1: 0.98,
                roc_auc: 0.99,
                confusion: ConfusionMatrix::default(),
            },
        }
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(Confidence::from_probability(0.95), Confidence::High);
        assert_eq!(Confidence::from_probability(0.8), Confidence::High);
        assert_eq!(Confidence::from_probability(0.2), Confidence::High);
        assert_eq!(Confidence::from_probability(0.7), Confidence::Medium);
        assert_eq!(Confidence::from_probability(0.4), Confidence::Medium);
        assert_eq!(Confidence::from_probability(0.5), Confidence::Low);
    }

    #[test]
    fn load_without_promotion_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(matches!(
            Predictor::load(&store),
            Err(MlGateError::NoPromotedModel)
        ));
    }

    #[test]
    fn predicts_with_promoted_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let ds = synthetic_dataset(100, 0.5, 3);
        let model = LogisticRegression::default().fit(&ds).unwrap();
        let digest = store.put_model(&model).unwrap();
        let verdict = decide(&GateRuleSet::standard(), passing_metrics());
        store
            .promote(&RunId::from("run-1"), &digest, &Digest::compute(b"d"), &verdict)
            .unwrap();

        let predictor = Predictor::load(&store).unwrap();
        assert_eq!(predictor.run_id(), &RunId::from("run-1"));

        let malignant = predictor.predict(&[16.0, 32.0, 0.0, 5.0]).unwrap();
        assert_eq!(malignant.class, 1);
        assert_eq!(malignant.label, "Malignant");
        assert!(malignant.probability > 0.5);
        assert_eq!(malignant.model_run_id, RunId::from("run-1"));

        let benign = predictor.predict(&[7.0, 14.0, 0.0, 5.0]).unwrap();
        assert_eq!(benign.class, 0);
        assert_eq!(benign.label, "Benign");
        assert_eq!(benign.confidence, Confidence::High);
    }

    #[test]
    fn wrong_feature_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let model = LogisticRegression::default()
            .fit(&synthetic_dataset(40, 0.5, 3))
            .unwrap();
        let digest = store.put_model(&model).unwrap();
        let verdict = decide(&GateRuleSet::standard(), passing_metrics());
        store
            .promote(&RunId::from("run-1"), &digest, &Digest::compute(b"d"), &verdict)
            .unwrap();

        let predictor = Predictor::load(&store).unwrap();
        let err = predictor.predict(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err.to_string(), "expected 4 features, got 3");
    }
}
