//! Detection engine: variant registry and ensemble orchestration.
//!
//! The engine owns the registered variants (in priority order, primary model
//! first), the shared preprocessing pipeline, the lazy model cache, and the
//! per-variant timeout budget. Each variant executes on its own named worker
//! thread so that a failure or overrun in one variant never blocks or
//! cancels its siblings; per-variant failures are recorded as tagged
//! entries in the ensemble result instead of propagating.

use crate::core::config::{EngineConfig, ModelVariant, VariantConfig};
use crate::core::errors::{DetectError, DetectResult, VariantFailure};
use crate::core::predictions::{EnsembleResult, Prediction, VariantOutcome, VariantStatus};
use crate::pipeline::cache::ModelCache;
use crate::pipeline::stats::{EngineStats, StatsManager};
use crate::predictor::executor;
use crate::processors::preprocess::{PreprocessedTensor, Preprocessor};
use crate::utils::device::parse_device;
use crate::utils::image::read_image_bytes;
use candle_core::Device;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default per-variant time budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The dual-model detection engine.
///
/// Exposes three operations to the caller: [`predict`](Self::predict) for a
/// single variant, [`predict_ensemble`](Self::predict_ensemble) for all
/// registered variants, and [`describe_registry`](Self::describe_registry)
/// for readiness introspection.
#[derive(Debug)]
pub struct DetectionEngine {
    variants: Vec<Arc<ModelVariant>>,
    preprocessor: Preprocessor,
    cache: Arc<ModelCache>,
    timeout: Duration,
    stats: StatsManager,
}

impl DetectionEngine {
    /// Starts building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Builds an engine from a validated configuration.
    pub fn from_config(config: EngineConfig) -> DetectResult<Self> {
        config.validate()?;
        let device = parse_device(&config.device)?;
        let mut builder = Self::builder()
            .device(device)
            .timeout(Duration::from_millis(config.timeout_ms));
        for variant in config.variants {
            builder = builder.register(variant);
        }
        builder.build()
    }

    /// Runs one registered variant against in-memory image bytes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown variant name, a
    /// preprocessing error for undecodable bytes, and a model-load,
    /// inference, or timeout error when the variant itself fails.
    pub fn predict(&self, variant: &str, image_bytes: &[u8]) -> DetectResult<Prediction> {
        let variant = self.lookup(variant)?;
        let input = self.preprocessor.process(image_bytes)?;
        let started = Instant::now();
        let receiver = self.spawn_worker(&variant, &input);
        let outcome = self.await_worker(&variant, receiver, started);
        self.record(&outcome);
        outcome
    }

    /// Reads the image at `path` and runs one registered variant on it.
    pub fn predict_path(&self, variant: &str, path: impl AsRef<Path>) -> DetectResult<Prediction> {
        let bytes = read_image_bytes(path.as_ref())?;
        self.predict(variant, &bytes)
    }

    /// Runs every registered variant against one shared preprocessed input.
    ///
    /// The result always holds one entry per registered variant. A failing
    /// variant contributes a tagged failure entry; only a preprocessing
    /// failure (before any variant runs) or the failure of every variant
    /// aborts the call.
    pub fn predict_ensemble(&self, image_bytes: &[u8]) -> DetectResult<EnsembleResult> {
        let input = self.preprocessor.process(image_bytes)?;

        let started = Instant::now();
        let pending: Vec<_> = self
            .variants
            .iter()
            .map(|variant| (Arc::clone(variant), self.spawn_worker(variant, &input)))
            .collect();

        let mut outcomes = Vec::with_capacity(pending.len());
        for (variant, receiver) in pending {
            let result = self.await_worker(&variant, receiver, started);
            self.record(&result);
            outcomes.push(match result {
                Ok(prediction) => VariantOutcome::Predicted(prediction),
                Err(error) => {
                    warn!(variant = variant.name(), error = %error, "variant failed");
                    VariantOutcome::Failed(VariantFailure::from_error(variant.name(), &error))
                }
            });
        }

        if outcomes.iter().all(|outcome| !outcome.is_success()) {
            let failures = outcomes
                .into_iter()
                .filter_map(|outcome| match outcome {
                    VariantOutcome::Failed(failure) => Some(failure),
                    VariantOutcome::Predicted(_) => None,
                })
                .collect();
            return Err(DetectError::AllVariantsFailed { failures });
        }
        Ok(EnsembleResult { outcomes })
    }

    /// Reads the image at `path` and runs the full ensemble on it.
    pub fn predict_ensemble_path(&self, path: impl AsRef<Path>) -> DetectResult<EnsembleResult> {
        let bytes = read_image_bytes(path.as_ref())?;
        self.predict_ensemble(&bytes)
    }

    /// Health/readiness introspection over the registry, used by callers to
    /// decide whether to offer detection at all.
    pub fn describe_registry(&self) -> Vec<VariantStatus> {
        self.variants
            .iter()
            .map(|variant| {
                let metadata = std::fs::metadata(variant.checkpoint());
                VariantStatus {
                    name: variant.name().to_string(),
                    version: variant.version().to_string(),
                    checkpoint_present: metadata.is_ok(),
                    checkpoint_size_bytes: metadata.map(|m| m.len()).unwrap_or(0),
                }
            })
            .collect()
    }

    /// Returns a snapshot of the engine's execution metrics.
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Drops every cached model; the next predict call reloads lazily.
    pub fn reset_cache(&self) {
        self.cache.reset();
    }

    /// Number of checkpoint load attempts performed so far.
    pub fn cache_load_count(&self) -> usize {
        self.cache.load_count()
    }

    fn lookup(&self, name: &str) -> DetectResult<Arc<ModelVariant>> {
        self.variants
            .iter()
            .find(|variant| variant.name() == name)
            .cloned()
            .ok_or_else(|| DetectError::configuration(format!("unknown variant '{name}'")))
    }

    /// Spawns a detached worker resolving the variant's model and running
    /// one forward pass. Detachment is what lets a timed-out variant keep
    /// running without blocking or cancelling its siblings.
    fn spawn_worker(
        &self,
        variant: &Arc<ModelVariant>,
        input: &PreprocessedTensor,
    ) -> mpsc::Receiver<DetectResult<Prediction>> {
        let (sender, receiver) = mpsc::channel();
        let cache = Arc::clone(&self.cache);
        let worker_variant = Arc::clone(variant);
        let input = input.clone();
        let spawned = thread::Builder::new()
            .name(format!("predict-{}", variant.name()))
            .spawn(move || {
                let result = cache
                    .get_or_load(&worker_variant)
                    .and_then(|model| executor::run(&model, &input));
                // The receiver may have given up on the budget already.
                let _ = sender.send(result);
            });
        if let Err(error) = spawned {
            warn!(variant = variant.name(), error = %error, "failed to spawn worker");
        }
        receiver
    }

    /// Waits for one worker under the per-variant budget, measured from the
    /// shared spawn instant so every variant gets an independent budget.
    fn await_worker(
        &self,
        variant: &ModelVariant,
        receiver: mpsc::Receiver<DetectResult<Prediction>>,
        started: Instant,
    ) -> DetectResult<Prediction> {
        let remaining = self.timeout.saturating_sub(started.elapsed());
        match receiver.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                Err(DetectError::timeout(variant.name_arc(), self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(DetectError::inference_message(
                variant.name_arc(),
                "inference worker terminated unexpectedly",
            )),
        }
    }

    fn record(&self, outcome: &DetectResult<Prediction>) {
        match outcome {
            Ok(prediction) => self.stats.record_success(prediction.duration),
            Err(_) => self.stats.record_failure(),
        }
    }
}

/// Builder for [`DetectionEngine`].
///
/// Variants are registered in priority order; the first registered variant
/// is the primary model.
pub struct EngineBuilder {
    variants: Vec<VariantConfig>,
    device: Device,
    timeout: Duration,
}

impl EngineBuilder {
    /// Creates a builder with an empty registry, the CPU device, and the
    /// default timeout budget.
    pub fn new() -> Self {
        Self {
            variants: Vec::new(),
            device: Device::Cpu,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Registers one variant. Order of registration is priority order.
    pub fn register(mut self, config: VariantConfig) -> Self {
        self.variants.push(config);
        self
    }

    /// Sets the compute device models are loaded onto.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Sets the per-variant timeout budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the registry and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the registry is empty, a variant
    /// name is empty or duplicated, or the timeout budget is zero.
    pub fn build(self) -> DetectResult<DetectionEngine> {
        if self.variants.is_empty() {
            return Err(DetectError::configuration(
                "at least one variant must be registered",
            ));
        }
        if self.timeout.is_zero() {
            return Err(DetectError::configuration(
                "timeout budget must be greater than 0",
            ));
        }

        let mut variants: Vec<Arc<ModelVariant>> = Vec::with_capacity(self.variants.len());
        for config in self.variants {
            let variant = ModelVariant::from_config(config)?;
            if variants.iter().any(|v| v.name() == variant.name()) {
                return Err(DetectError::configuration(format!(
                    "duplicate variant name '{}'",
                    variant.name()
                )));
            }
            variants.push(Arc::new(variant));
        }

        info!(
            variants = variants.len(),
            primary = variants[0].name(),
            "detection engine ready"
        );
        Ok(DetectionEngine {
            preprocessor: Preprocessor::new(self.device.clone()),
            cache: Arc::new(ModelCache::new(self.device)),
            variants,
            timeout: self.timeout,
            stats: StatsManager::new(),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::FailureKind;
    use crate::core::predictions::Label;
    use crate::models::architecture::{BackboneKind, build_with_varmap};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_fn(160, 120, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn fabricate_checkpoint(kind: BackboneKind, path: &Path) {
        let (varmap, _model) = build_with_varmap(kind, &Device::Cpu).unwrap();
        varmap.save(path).unwrap();
    }

    /// Two RegNet-topology variants with distinct names and checkpoints,
    /// `a` present and `b` optionally present.
    fn dual_regnet_engine(dir: &Path, fabricate_b: bool) -> DetectionEngine {
        let path_a = dir.join("a.safetensors");
        let path_b = dir.join("b.safetensors");
        fabricate_checkpoint(BackboneKind::RegNet, &path_a);
        if fabricate_b {
            fabricate_checkpoint(BackboneKind::RegNet, &path_b);
        }
        DetectionEngine::builder()
            .register(VariantConfig::new("a", BackboneKind::RegNet, &path_a))
            .register(VariantConfig::new("b", BackboneKind::RegNet, &path_b))
            .build()
            .unwrap()
    }

    #[test]
    fn ensemble_returns_one_entry_per_variant() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dual_regnet_engine(dir.path(), true);

        let result = engine.predict_ensemble(&png_bytes()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.successes().count(), 2);
        assert_eq!(result.outcomes[0].variant(), "a");
        assert_eq!(result.outcomes[1].variant(), "b");

        for prediction in result.successes() {
            assert!((0.0..=1.0).contains(&prediction.confidence));
            assert_eq!(
                prediction.label == Label::Cancer,
                prediction.raw_probability >= 0.5
            );
        }
    }

    #[test]
    fn failure_in_one_variant_does_not_abort_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dual_regnet_engine(dir.path(), false);

        let error = engine.predict("b", &png_bytes()).unwrap_err();
        assert!(matches!(error, DetectError::ModelLoad { .. }));

        engine.predict("a", &png_bytes()).unwrap();

        let result = engine.predict_ensemble(&png_bytes()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.successes().count(), 1);
        let failure = result.failures().next().unwrap();
        assert_eq!(failure.variant, "b");
        assert_eq!(failure.kind, FailureKind::ModelLoad);
    }

    #[test]
    fn all_variants_failing_raises_a_combined_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = DetectionEngine::builder()
            .register(VariantConfig::new(
                "a",
                BackboneKind::RegNet,
                dir.path().join("missing_a.safetensors"),
            ))
            .register(VariantConfig::new(
                "b",
                BackboneKind::RegNet,
                dir.path().join("missing_b.safetensors"),
            ))
            .build()
            .unwrap();

        let error = engine.predict_ensemble(&png_bytes()).unwrap_err();
        match error {
            DetectError::AllVariantsFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| f.kind == FailureKind::ModelLoad));
            }
            other => panic!("expected combined failure, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_input_aborts_before_any_variant_runs() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dual_regnet_engine(dir.path(), true);

        let error = engine.predict_ensemble(b"not an image").unwrap_err();
        assert!(matches!(error, DetectError::Preprocessing { .. }));
        // No variant executed, so nothing was loaded.
        assert_eq!(engine.cache_load_count(), 0);
    }

    #[test]
    fn unknown_variant_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dual_regnet_engine(dir.path(), true);

        let error = engine.predict("densenet", &png_bytes()).unwrap_err();
        assert!(matches!(error, DetectError::Configuration { .. }));
    }

    #[test]
    fn overrunning_variant_is_reported_as_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.safetensors");
        fabricate_checkpoint(BackboneKind::RegNet, &path);
        let engine = DetectionEngine::builder()
            .register(VariantConfig::new("a", BackboneKind::RegNet, &path))
            .timeout(Duration::from_nanos(1))
            .build()
            .unwrap();

        let error = engine.predict("a", &png_bytes()).unwrap_err();
        assert!(matches!(error, DetectError::Timeout { .. }));
    }

    #[test]
    fn describe_registry_reports_checkpoint_presence() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dual_regnet_engine(dir.path(), false);

        let statuses = engine.describe_registry();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].checkpoint_present);
        assert!(statuses[0].checkpoint_size_bytes > 0);
        assert!(!statuses[1].checkpoint_present);
        assert_eq!(statuses[1].checkpoint_size_bytes, 0);
        assert_eq!(statuses[0].version, "v1.0");
    }

    #[test]
    fn stats_track_per_variant_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dual_regnet_engine(dir.path(), false);

        engine.predict_ensemble(&png_bytes()).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.total_predictions, 2);
        assert_eq!(stats.successful_predictions, 1);
        assert_eq!(stats.failed_predictions, 1);
    }

    #[test]
    fn mixed_backbone_ensemble_shares_one_input() {
        let dir = tempfile::tempdir().unwrap();
        let regnet_path = dir.path().join("regnet_best.safetensors");
        let vgg_path = dir.path().join("vgg16_best.safetensors");
        fabricate_checkpoint(BackboneKind::RegNet, &regnet_path);
        fabricate_checkpoint(BackboneKind::Vgg, &vgg_path);

        let engine = DetectionEngine::builder()
            .register(VariantConfig::new("regnet", BackboneKind::RegNet, &regnet_path))
            .register(VariantConfig::new("vgg16", BackboneKind::Vgg, &vgg_path))
            .build()
            .unwrap();

        let result = engine.predict_ensemble(&png_bytes()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.successes().count(), 2);
        assert_eq!(engine.cache_load_count(), 2);

        // Cached models are reused on the next call.
        engine.predict_ensemble(&png_bytes()).unwrap();
        assert_eq!(engine.cache_load_count(), 2);
    }

    #[test]
    fn builder_rejects_duplicate_and_empty_registrations() {
        let error = DetectionEngine::builder().build().unwrap_err();
        assert!(matches!(error, DetectError::Configuration { .. }));

        let error = DetectionEngine::builder()
            .register(VariantConfig::new("a", BackboneKind::RegNet, "a.safetensors"))
            .register(VariantConfig::new("a", BackboneKind::Vgg, "b.safetensors"))
            .build()
            .unwrap_err();
        assert!(error.to_string().contains("duplicate variant name"));
    }
}
