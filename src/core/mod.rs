//! Core types of the detection engine.
//!
//! This module contains the fundamental, model-independent pieces:
//! - Error handling and per-variant failure entries
//! - Engine and variant configuration
//! - Structured prediction results
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod config;
pub mod errors;
pub mod predictions;

pub use config::{EngineConfig, ModelVariant, VariantConfig};
pub use errors::{DetectError, DetectResult, FailureKind, VariantFailure};
pub use predictions::{EnsembleResult, Label, Prediction, VariantOutcome, VariantStatus};

/// Initializes the tracing subscriber for logging.
///
/// Sets up the subscriber with the environment filter and a formatting
/// layer. Typically called once at application start by binaries embedding
/// the engine.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
