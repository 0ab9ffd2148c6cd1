//! Promotion gate rules engine.
//!
//! Evaluates cross-validation aggregates against a [`GateRuleSet`] and
//! produces a [`PromotionVerdict`]: the promote / reject decision for a
//! freshly trained model. Only cross-validation statistics are consulted;
//! held-out test metrics ride along in the verdict for audit.
//!
//! The gate fails closed. Any non-finite or out-of-range CV aggregate yields
//! a [`GateRule::FiniteMetrics`] violation before any other rule runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{AggregateMetrics, CvSummary, MlGateError, Result};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Thresholds referenced by the gate rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionThresholds {
    /// Minimum mean CV recall.
    pub min_recall: f64,
    /// Maximum sample standard deviation of CV recall.
    pub max_recall_std: f64,
    /// Stop at the first violation.
    pub fail_fast: bool,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            min_recall: 0.95,
            max_recall_std: 0.05,
            fail_fast: false,
        }
    }
}

impl PromotionThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("min_recall", self.min_recall),
            ("max_recall_std", self.max_recall_std),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(MlGateError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gate rules
// ---------------------------------------------------------------------------

/// A single rule that can block promotion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateRule {
    /// Every CV aggregate must be finite and within [0, 1].
    FiniteMetrics,
    /// Mean CV recall must meet or exceed `min_recall`.
    MinRecallMean,
    /// CV recall standard deviation must not exceed `max_recall_std`.
    MaxRecallStd,
}

/// A set of gate rules plus the thresholds they reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateRuleSet {
    pub thresholds: PromotionThresholds,
    pub rules: Vec<GateRule>,
}

impl GateRuleSet {
    /// Default thresholds with `MinRecallMean` and `MaxRecallStd`.
    pub fn standard() -> Self {
        Self {
            thresholds: PromotionThresholds::default(),
            rules: vec![GateRule::MinRecallMean, GateRule::MaxRecallStd],
        }
    }

    pub fn with_rule(mut self, rule: GateRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_thresholds(mut self, thresholds: PromotionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    pub rule: GateRule,
    pub reason: String,
}

/// Rule-level outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateVerdict {
    /// Empty when passed.
    pub violations: Vec<Violation>,
}

impl GateVerdict {
    fn pass() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    fn fail(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// The promotion decision for one run. Created exactly once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionVerdict {
    pub promote: bool,
    pub violations: Vec<Violation>,
    /// The metrics that produced this verdict.
    pub metrics: AggregateMetrics,
    pub thresholds: PromotionThresholds,
    pub evaluated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Evaluate CV aggregates against a [`GateRuleSet`].
///
/// The finiteness check always runs first. With `fail_fast`, evaluation
/// stops at the first violation.
pub fn evaluate_gate(rule_set: &GateRuleSet, cv: &CvSummary) -> GateVerdict {
    let mut violations = Vec::new();
    let fail_fast = rule_set.thresholds.fail_fast;

    if let Some(v) = check_rule(&GateRule::FiniteMetrics, &rule_set.thresholds, cv) {
        warn!(event = "gate.non_finite_metrics", reason = %v.reason);
        violations.push(v);
        if fail_fast {
            return GateVerdict::fail(violations);
        }
    }

    for rule in &rule_set.rules {
        if *rule == GateRule::FiniteMetrics {
            continue;
        }
        if let Some(v) = check_rule(rule, &rule_set.thresholds, cv) {
            violations.push(v);
            if fail_fast {
                return GateVerdict::fail(violations);
            }
        }
    }

    if violations.is_empty() {
        GateVerdict::pass()
    } else {
        GateVerdict::fail(violations)
    }
}

/// Evaluate the gate and wrap the outcome with its inputs and a timestamp.
pub fn decide(rule_set: &GateRuleSet, metrics: AggregateMetrics) -> PromotionVerdict {
    let verdict = evaluate_gate(rule_set, &metrics.cv);
    PromotionVerdict {
        promote: verdict.passed(),
        violations: verdict.violations,
        metrics,
        thresholds: rule_set.thresholds.clone(),
        evaluated_at: Utc::now(),
    }
}

fn in_unit_range(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

// Comparisons are written so a NaN fails the rule.
fn check_rule(rule: &GateRule, thresholds: &PromotionThresholds, cv: &CvSummary) -> Option<Violation> {
    match rule {
        GateRule::FiniteMetrics => {
            let bad: Vec<String> = cv
                .summaries()
                .iter()
                .filter(|(_, s)| !(in_unit_range(s.mean) && in_unit_range(s.std)))
                .map(|(name, s)| format!("{name} (mean {}, std {})", s.mean, s.std))
                .collect();
            if bad.is_empty() {
                None
            } else {
                Some(Violation {
                    rule: rule.clone(),
                    reason: format!("invalid CV aggregates: {}", bad.join(", ")),
                })
            }
        }
        GateRule::MinRecallMean => {
            if cv.recall.mean >= thresholds.min_recall {
                None
            } else {
                Some(Violation {
                    rule: rule.clone(),
                    reason: format!(
                        "recall mean {:.4} < required {:.4}",
                        cv.recall.mean, thresholds.min_recall,
                    ),
                })
            }
        }
        GateRule::MaxRecallStd => {
            if cv.recall.std <= thresholds.max_recall_std {
                None
            } else {
                Some(Violation {
                    rule: rule.clone(),
                    reason: format!(
                        "recall std {:.4} > allowed {:.4}",
                        cv.recall.std, thresholds.max_recall_std,
                    ),
                })
            }
        }
    }
}
