//! Error types for the detection engine.
//!
//! This module defines the error kinds that can occur while serving a
//! prediction: configuration problems, preprocessing failures, per-variant
//! checkpoint and inference failures, and timeouts. It also provides the
//! tagged per-variant failure entries the ensemble orchestrator records when
//! a single variant fails without aborting its siblings.

use crate::models::checkpoint::CheckpointError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type DetectResult<T> = Result<T, DetectError>;

/// Enum representing the errors that can occur while serving a prediction.
///
/// `Configuration` and `Preprocessing` abort a whole call. `ModelLoad`,
/// `Inference`, and `Timeout` are scoped to a single variant; during an
/// ensemble run they are caught at the orchestrator boundary and recorded as
/// per-variant failure entries instead of propagating.
#[derive(Error, Debug)]
pub enum DetectError {
    /// Unknown variant name or malformed registry entry.
    #[error("configuration: {message}")]
    Configuration {
        /// A message describing the configuration problem.
        message: String,
    },

    /// The shared input image could not be decoded or read. No variant can
    /// succeed on an un-produced tensor, so this aborts the call before any
    /// variant runs.
    #[error("preprocessing failed: {context}")]
    Preprocessing {
        /// What the pipeline was doing when it failed.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A variant's checkpoint could not be resolved into its architecture.
    /// Never retried within a call: a corrupt or missing checkpoint cannot
    /// load on a second attempt.
    #[error("model load failed for variant '{variant}'")]
    ModelLoad {
        /// The variant whose checkpoint failed to load.
        variant: Arc<str>,
        /// The cause of the load failure.
        #[source]
        source: CheckpointError,
    },

    /// The forward pass failed at runtime for one variant.
    #[error("inference failed for variant '{variant}': {context}")]
    Inference {
        /// The variant whose forward pass failed.
        variant: Arc<str>,
        /// What the executor was doing when it failed.
        context: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// One variant exceeded its per-call time budget. Recorded distinctly
    /// from `Inference` so callers can tell "slow" from "broken".
    #[error("variant '{variant}' timed out after {} ms", .budget.as_millis())]
    Timeout {
        /// The variant that overran its budget.
        variant: Arc<str>,
        /// The budget that was exceeded.
        budget: Duration,
    },

    /// Every registered variant failed within one ensemble run. Enumerates
    /// each variant's individual cause rather than surfacing only the first.
    #[error("all {} registered variants failed", .failures.len())]
    AllVariantsFailed {
        /// One tagged entry per failed variant, in priority order.
        failures: Vec<VariantFailure>,
    },
}

impl DetectError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a preprocessing error with context.
    pub fn preprocessing(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Preprocessing {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates an inference error wrapping an underlying cause.
    pub fn inference(
        variant: impl Into<Arc<str>>,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            variant: variant.into(),
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an inference error from a bare message.
    pub fn inference_message(variant: impl Into<Arc<str>>, context: impl Into<String>) -> Self {
        Self::Inference {
            variant: variant.into(),
            context: context.into(),
            source: None,
        }
    }

    /// Creates a timeout error for one variant.
    pub fn timeout(variant: impl Into<Arc<str>>, budget: Duration) -> Self {
        Self::Timeout {
            variant: variant.into(),
            budget,
        }
    }

    /// Renders this error and its source chain as one message, outermost
    /// cause first.
    pub fn chained_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Tag identifying which stage a variant failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The checkpoint could not be resolved into the architecture.
    ModelLoad,
    /// The forward pass failed at runtime.
    Inference,
    /// The variant exceeded its time budget.
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::ModelLoad => write!(f, "model load"),
            FailureKind::Inference => write!(f, "inference"),
            FailureKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// A single variant's failure within an ensemble run.
///
/// Recorded by the orchestrator in place of a prediction; never substituted
/// with a default confidence or a guessed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantFailure {
    /// Name of the variant that failed.
    pub variant: String,
    /// Which stage failed.
    pub kind: FailureKind,
    /// Human-readable cause, including the source chain.
    pub message: String,
}

impl VariantFailure {
    /// Builds a tagged failure entry from a variant-scoped error.
    pub(crate) fn from_error(variant: &str, error: &DetectError) -> Self {
        let kind = match error {
            DetectError::ModelLoad { .. } => FailureKind::ModelLoad,
            DetectError::Timeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Inference,
        };
        Self {
            variant: variant.to_string(),
            kind,
            message: error.chained_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn failure_kind_tracks_error_variant() {
        let missing = DetectError::ModelLoad {
            variant: Arc::from("regnet"),
            source: CheckpointError::Missing {
                path: PathBuf::from("gone.safetensors"),
            },
        };
        assert_eq!(
            VariantFailure::from_error("regnet", &missing).kind,
            FailureKind::ModelLoad
        );

        let timeout = DetectError::timeout("regnet", Duration::from_millis(250));
        assert_eq!(
            VariantFailure::from_error("regnet", &timeout).kind,
            FailureKind::Timeout
        );

        let inference = DetectError::inference_message("regnet", "bad logits");
        assert_eq!(
            VariantFailure::from_error("regnet", &inference).kind,
            FailureKind::Inference
        );
    }

    #[test]
    fn chained_message_includes_source() {
        let error = DetectError::ModelLoad {
            variant: Arc::from("vgg16"),
            source: CheckpointError::Missing {
                path: PathBuf::from("models/vgg16_best.safetensors"),
            },
        };
        let message = error.chained_message();
        assert!(message.contains("model load failed for variant 'vgg16'"));
        assert!(message.contains("models/vgg16_best.safetensors"));
    }

    #[test]
    fn timeout_message_reports_budget() {
        let error = DetectError::timeout("regnet", Duration::from_millis(1500));
        assert_eq!(
            error.to_string(),
            "variant 'regnet' timed out after 1500 ms"
        );
    }
}
