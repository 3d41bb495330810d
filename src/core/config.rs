//! Engine configuration types.
//!
//! This module defines the serde-backed configuration for the detection
//! engine: the variant registry entries and the engine-wide settings
//! (per-variant timeout budget, compute device). Configurations can be
//! built programmatically or loaded from JSON; both paths go through the
//! same validation.

use crate::core::errors::{DetectError, DetectResult};
use crate::models::architecture::BackboneKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default per-variant timeout budget in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default version tag recorded on predictions.
pub const DEFAULT_MODEL_VERSION: &str = "v1.0";

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_version() -> String {
    DEFAULT_MODEL_VERSION.to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

/// Configuration for one registered model variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Unique variant name, used as the identifier in `predict` calls.
    pub name: String,
    /// Backbone topology used to reconstruct the checkpoint's architecture.
    pub backbone: BackboneKind,
    /// Path to the serialized weights.
    pub checkpoint: PathBuf,
    /// Version tag recorded on every prediction from this variant.
    #[serde(default = "default_version")]
    pub version: String,
}

impl VariantConfig {
    /// Creates a variant configuration with the default version tag.
    pub fn new(
        name: impl Into<String>,
        backbone: BackboneKind,
        checkpoint: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            backbone,
            checkpoint: checkpoint.into(),
            version: default_version(),
        }
    }

    /// Overrides the version tag.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Configuration for the whole detection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Registered variants in priority order; the primary model comes first.
    pub variants: Vec<VariantConfig>,
    /// Per-variant timeout budget in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Compute device string: `"cpu"`, `"cuda"`, or `"cuda:N"`.
    #[serde(default = "default_device")]
    pub device: String,
}

impl EngineConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json(json: &str) -> DetectResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            DetectError::configuration(format!("invalid engine configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> DetectResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DetectError::configuration(format!(
                "failed to read configuration {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    /// The standard two-model registry: the RegNet-style variant as primary
    /// and the VGG-style variant second, with checkpoints under `models_dir`.
    pub fn default_pair(models_dir: impl AsRef<Path>) -> Self {
        let models_dir = models_dir.as_ref();
        Self {
            variants: vec![
                VariantConfig::new(
                    "regnet",
                    BackboneKind::RegNet,
                    models_dir.join("regnet_best.safetensors"),
                ),
                VariantConfig::new(
                    "vgg16",
                    BackboneKind::Vgg,
                    models_dir.join("vgg16_best.safetensors"),
                ),
            ],
            timeout_ms: DEFAULT_TIMEOUT_MS,
            device: default_device(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if:
    /// * no variants are registered
    /// * a variant name is empty or duplicated
    /// * the timeout budget is zero
    pub fn validate(&self) -> DetectResult<()> {
        if self.variants.is_empty() {
            return Err(DetectError::configuration(
                "at least one variant must be registered",
            ));
        }
        let mut seen = HashSet::new();
        for variant in &self.variants {
            if variant.name.trim().is_empty() {
                return Err(DetectError::configuration("variant name must not be empty"));
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(DetectError::configuration(format!(
                    "duplicate variant name '{}'",
                    variant.name
                )));
            }
        }
        if self.timeout_ms == 0 {
            return Err(DetectError::configuration(
                "timeout_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// One registered model variant. Immutable once registered.
#[derive(Debug, Clone)]
pub struct ModelVariant {
    name: Arc<str>,
    backbone: BackboneKind,
    checkpoint: PathBuf,
    version: Arc<str>,
}

impl ModelVariant {
    /// Validates a [`VariantConfig`] and freezes it into a registry entry.
    pub fn from_config(config: VariantConfig) -> DetectResult<Self> {
        if config.name.trim().is_empty() {
            return Err(DetectError::configuration("variant name must not be empty"));
        }
        Ok(Self {
            name: Arc::from(config.name.as_str()),
            backbone: config.backbone,
            checkpoint: config.checkpoint,
            version: Arc::from(config.version.as_str()),
        })
    }

    /// The variant's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the variant's name.
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The backbone topology that reconstructs this variant's architecture.
    pub fn backbone(&self) -> BackboneKind {
        self.backbone
    }

    /// Location of the serialized weights.
    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }

    /// The variant's version tag.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Shared handle to the variant's version tag.
    pub fn version_arc(&self) -> Arc<str> {
        Arc::clone(&self.version)
    }
}
