//! Promotion, rollback and promotion history.
//!
//! Promoting writes an immutable metadata blob that links to the model blob
//! and to the previously promoted metadata, then swaps `CURRENT` to it. The
//! pointer is written last: if anything before it fails, the served model is
//! unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cas::{get_json, put_json, CasStore, Digest};
use crate::domain::{AggregateMetrics, MlGateError, Result, RunId};
use crate::gate::{PromotionThresholds, PromotionVerdict};
use crate::model::LogisticModel;
use crate::obs;
use crate::store::{ArtifactStore, CurrentPointer};

/// Immutable record of one promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionMetadata {
    pub run_id: RunId,
    pub promoted_at: DateTime<Utc>,
    pub model_digest: Digest,
    pub data_version: Digest,
    pub metrics: AggregateMetrics,
    pub thresholds: PromotionThresholds,
    /// Metadata digest that was current before this promotion.
    pub previous: Option<Digest>,
}

/// A metadata blob together with its address.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub digest: Digest,
    pub metadata: PromotionMetadata,
}

impl ArtifactStore {
    /// Store a fitted model and return its digest.
    pub fn put_model(&self, model: &LogisticModel) -> Result<Digest> {
        Ok(put_json(self.cas(), model)?)
    }

    /// Load and sanity-check a model blob.
    pub fn model(&self, digest: &Digest) -> Result<LogisticModel> {
        let model: LogisticModel = get_json(self.cas(), digest)?;
        model.validate()?;
        Ok(model)
    }

    fn promotion(&self, digest: &Digest) -> Result<Promotion> {
        let metadata = get_json(self.cas(), digest)?;
        Ok(Promotion {
            digest: *digest,
            metadata,
        })
    }

    /// Make the run's model the served one.
    ///
    /// Refuses verdicts that did not pass the gate, and model digests that
    /// are not in the store.
    pub fn promote(
        &self,
        run_id: &RunId,
        model_digest: &Digest,
        data_version: &Digest,
        verdict: &PromotionVerdict,
    ) -> Result<Promotion> {
        if !verdict.promote {
            return Err(MlGateError::PromotionRefused(format!(
                "run {run_id} did not pass the gate"
            )));
        }
        if !self.cas().exists(model_digest)? {
            return Err(MlGateError::PromotionRefused(format!(
                "model blob {} is not in the store",
                model_digest.short()
            )));
        }

        let previous = self.read_pointer()?.map(|p| p.metadata);
        let metadata = PromotionMetadata {
            run_id: run_id.clone(),
            promoted_at: Utc::now(),
            model_digest: *model_digest,
            data_version: *data_version,
            metrics: verdict.metrics.clone(),
            thresholds: verdict.thresholds.clone(),
            previous,
        };
        let digest = put_json(self.cas(), &metadata)?;

        self.write_pointer(&CurrentPointer {
            metadata: digest,
            run_id: run_id.clone(),
            updated_at: metadata.promoted_at,
        })?;
        obs::emit_promotion_applied(run_id.as_str(), &digest.short());

        Ok(Promotion { digest, metadata })
    }

    /// The currently promoted metadata, if any.
    ///
    /// The metadata's run id must agree with the pointer's.
    pub fn current(&self) -> Result<Option<Promotion>> {
        let Some(pointer) = self.read_pointer()? else {
            return Ok(None);
        };
        let promotion = self.promotion(&pointer.metadata)?;
        if promotion.metadata.run_id != pointer.run_id {
            return Err(MlGateError::ArtifactMismatch(format!(
                "CURRENT names run {} but metadata {} belongs to run {}",
                pointer.run_id,
                pointer.metadata.short(),
                promotion.metadata.run_id
            )));
        }
        Ok(Some(promotion))
    }

    /// Promotions reachable from `CURRENT`, newest first.
    pub fn history(&self) -> Result<Vec<Promotion>> {
        let mut out = Vec::new();
        let mut next = self.current()?;
        while let Some(promotion) = next {
            next = match promotion.metadata.previous {
                Some(prev) => Some(self.promotion(&prev)?),
                None => None,
            };
            out.push(promotion);
        }
        Ok(out)
    }

    /// Point `CURRENT` back at the promotion before the current one.
    pub fn rollback(&self) -> Result<Promotion> {
        let current = self.current()?.ok_or(MlGateError::NoPromotedModel)?;
        let target_digest = current.metadata.previous.ok_or_else(|| {
            MlGateError::RollbackUnavailable(format!(
                "run {} is the first promotion",
                current.metadata.run_id
            ))
        })?;
        let target = self.promotion(&target_digest)?;
        // The target's model must still load before it can be served again.
        self.model(&target.metadata.model_digest)?;

        self.write_pointer(&CurrentPointer {
            metadata: target.digest,
            run_id: target.metadata.run_id.clone(),
            updated_at: Utc::now(),
        })?;
        obs::emit_rollback(
            current.metadata.run_id.as_str(),
            target.metadata.run_id.as_str(),
        );
        Ok(target)
    }
}
