//! # OncoDetect
//!
//! A dual-model oral cancer detection inference engine built on
//! [Candle](https://github.com/huggingface/candle). The crate loads
//! independently trained convolutional checkpoints into architecture-matched
//! model objects, funnels every input image through one deterministic
//! preprocessing pipeline, and runs all registered model variants as an
//! ensemble in which a failure of one variant never aborts the others.
//!
//! ## Features
//!
//! - Closed set of backbone topologies (plain convolutional stack and a
//!   residual stack with grouped convolutions) behind one two-class head
//!   contract
//! - Checkpoint loading from safetensors, accepting both a raw parameter
//!   mapping and a wrapped training container with metadata
//! - Deterministic 224x224 preprocessing shared by every variant
//! - Lazy per-variant model cache with a load-once guard
//! - Per-variant timeout budgets and structured per-variant failure entries
//!
//! ## Components
//!
//! * [`core`] - Error types, configuration, and prediction results
//! * [`models`] - Network topology construction and checkpoint resolution
//! * [`processors`] - Image-to-tensor preprocessing
//! * [`predictor`] - Single forward-pass execution
//! * [`pipeline`] - Model cache, ensemble orchestration, and statistics
//! * [`utils`] - Device parsing and image loading helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oncodetect::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DetectionEngine::builder()
//!     .register(VariantConfig::new(
//!         "regnet",
//!         BackboneKind::RegNet,
//!         "models/regnet_best.safetensors",
//!     ))
//!     .register(VariantConfig::new(
//!         "vgg16",
//!         BackboneKind::Vgg,
//!         "models/vgg16_best.safetensors",
//!     ))
//!     .build()?;
//!
//! let image = std::fs::read("lesion.jpg")?;
//! let result = engine.predict_ensemble(&image)?;
//! for prediction in result.successes() {
//!     println!(
//!         "{}: {} ({:.1}%)",
//!         prediction.model,
//!         prediction.label,
//!         prediction.confidence * 100.0
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## JSON Configuration
//!
//! ```rust,no_run
//! use oncodetect::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DetectionEngine::from_config(EngineConfig::from_json(
//!     r#"
//! {
//!   "variants": [
//!     {
//!       "name": "regnet",
//!       "backbone": "regnet",
//!       "checkpoint": "models/regnet_best.safetensors",
//!       "version": "v1.0"
//!     },
//!     {
//!       "name": "vgg16",
//!       "backbone": "vgg",
//!       "checkpoint": "models/vgg16_best.safetensors"
//!     }
//!   ],
//!   "timeout_ms": 10000,
//!   "device": "cpu"
//! }
//! "#,
//! )?)?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod models;
pub mod pipeline;
pub mod predictor;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use oncodetect::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::config::{EngineConfig, VariantConfig};
    pub use crate::core::errors::{DetectError, DetectResult, FailureKind, VariantFailure};
    pub use crate::core::predictions::{
        EnsembleResult, Label, Prediction, VariantOutcome, VariantStatus,
    };
    pub use crate::models::architecture::BackboneKind;
    pub use crate::pipeline::engine::{DetectionEngine, EngineBuilder};
}
