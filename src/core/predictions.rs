//! Structured prediction outputs.
//!
//! This module defines the result types returned to the caller: single-model
//! predictions, per-variant ensemble outcomes, and the registry status
//! entries used for readiness checks. All of them serialize with serde so
//! the persistence layer can store them as-is.

use crate::core::errors::VariantFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Binary class label produced by every variant.
///
/// Class index 1 of the logits is the positive (cancer) class; index 0 is
/// the negative class. The mapping is fixed and not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    /// The positive class.
    #[serde(rename = "Cancer")]
    Cancer,
    /// The negative class.
    #[serde(rename = "Non-Cancer")]
    NonCancer,
}

impl Label {
    /// Maps a class index onto its label (1 -> `Cancer`, 0 -> `NonCancer`).
    pub fn from_class_index(index: usize) -> Self {
        if index == 1 {
            Label::Cancer
        } else {
            Label::NonCancer
        }
    }

    /// Returns the label as the string persisted by callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Cancer => "Cancer",
            Label::NonCancer => "Non-Cancer",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One model's output for one image.
///
/// Invariant: `label` is [`Label::Cancer`] iff `raw_probability >= 0.5`,
/// i.e. the label is always the argmax class of the softmax output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Name of the variant that produced this prediction.
    pub model: String,
    /// Version tag of the trained checkpoint.
    pub model_version: String,
    /// Argmax class label.
    pub label: Label,
    /// Probability of the predicted class, always in `[0, 1]`.
    pub confidence: f32,
    /// Probability of the positive (cancer) class, always in `[0, 1]`.
    pub raw_probability: f32,
    /// Wall-clock duration of the forward pass only; excludes preprocessing
    /// and model load.
    pub duration: Duration,
}

/// Outcome of one registered variant within an ensemble run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariantOutcome {
    /// The variant produced a prediction.
    Predicted(Prediction),
    /// The variant failed; the failure never aborted its siblings.
    Failed(VariantFailure),
}

impl VariantOutcome {
    /// Name of the variant this outcome belongs to.
    pub fn variant(&self) -> &str {
        match self {
            VariantOutcome::Predicted(prediction) => &prediction.model,
            VariantOutcome::Failed(failure) => &failure.variant,
        }
    }

    /// Returns the prediction if this outcome is a success.
    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            VariantOutcome::Predicted(prediction) => Some(prediction),
            VariantOutcome::Failed(_) => None,
        }
    }

    /// Returns the failure entry if this outcome is a failure.
    pub fn failure(&self) -> Option<&VariantFailure> {
        match self {
            VariantOutcome::Predicted(_) => None,
            VariantOutcome::Failed(failure) => Some(failure),
        }
    }

    /// Whether the variant produced a prediction.
    pub fn is_success(&self) -> bool {
        matches!(self, VariantOutcome::Predicted(_))
    }
}

/// Aggregated output of an ensemble run.
///
/// Holds exactly one entry per registered variant, in priority order,
/// regardless of how many variants failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// Per-variant outcomes in priority order.
    pub outcomes: Vec<VariantOutcome>,
}

impl EnsembleResult {
    /// Number of per-variant entries; always equals the registered-variant
    /// count.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the result holds no entries.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Iterates over the successful predictions.
    pub fn successes(&self) -> impl Iterator<Item = &Prediction> {
        self.outcomes.iter().filter_map(VariantOutcome::prediction)
    }

    /// Iterates over the tagged failure entries.
    pub fn failures(&self) -> impl Iterator<Item = &VariantFailure> {
        self.outcomes.iter().filter_map(VariantOutcome::failure)
    }

    /// Looks up the outcome for one variant by name.
    pub fn get(&self, variant: &str) -> Option<&VariantOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.variant() == variant)
    }
}

/// Registry introspection entry used for health and readiness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantStatus {
    /// Registered variant name.
    pub name: String,
    /// Version tag of the variant.
    pub version: String,
    /// Whether the checkpoint file exists on disk.
    pub checkpoint_present: bool,
    /// Size of the checkpoint file in bytes; 0 when absent.
    pub checkpoint_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::FailureKind;

    fn sample_prediction() -> Prediction {
        Prediction {
            model: "regnet".to_string(),
            model_version: "v1.0".to_string(),
            label: Label::Cancer,
            confidence: 0.91,
            raw_probability: 0.91,
            duration: Duration::from_millis(42),
        }
    }

    #[test]
    fn label_maps_class_indexes() {
        assert_eq!(Label::from_class_index(1), Label::Cancer);
        assert_eq!(Label::from_class_index(0), Label::NonCancer);
        assert_eq!(Label::Cancer.to_string(), "Cancer");
        assert_eq!(Label::NonCancer.to_string(), "Non-Cancer");
    }

    #[test]
    fn label_serializes_with_persisted_names() {
        assert_eq!(
            serde_json::to_string(&Label::NonCancer).unwrap(),
            "\"Non-Cancer\""
        );
        let parsed: Label = serde_json::from_str("\"Cancer\"").unwrap();
        assert_eq!(parsed, Label::Cancer);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = VariantOutcome::Failed(VariantFailure {
            variant: "vgg16".to_string(),
            kind: FailureKind::Timeout,
            message: "variant 'vgg16' timed out after 100 ms".to_string(),
        });
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"kind\":\"timeout\""));

        let json = serde_json::to_string(&VariantOutcome::Predicted(sample_prediction())).unwrap();
        assert!(json.contains("\"status\":\"predicted\""));
    }

    #[test]
    fn ensemble_result_filters_outcomes() {
        let result = EnsembleResult {
            outcomes: vec![
                VariantOutcome::Predicted(sample_prediction()),
                VariantOutcome::Failed(VariantFailure {
                    variant: "vgg16".to_string(),
                    kind: FailureKind::ModelLoad,
                    message: "missing checkpoint".to_string(),
                }),
            ],
        };
        assert_eq!(result.len(), 2);
        assert_eq!(result.successes().count(), 1);
        assert_eq!(result.failures().count(), 1);
        assert!(result.get("regnet").is_some_and(VariantOutcome::is_success));
        assert!(result.get("vgg16").is_some_and(|o| !o.is_success()));
        assert!(result.get("densenet").is_none());
    }
}
