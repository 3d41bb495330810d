//! Lazily populated model cache.
//!
//! Resolving a variant (architecture construction plus checkpoint loading)
//! is expensive, so each variant is loaded at most once behind a per-variant
//! guard and shared read-only afterwards. The map lock's critical section
//! covers only entry lookup: loading variant A never blocks loading variant
//! B, and two concurrent first-time requests for the same variant perform
//! exactly one load.

use crate::core::config::ModelVariant;
use crate::core::errors::{DetectError, DetectResult};
use crate::models::architecture::DetectionModel;
use crate::models::checkpoint;
use candle_core::Device;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

/// A variant's architecture populated with its trained weights.
///
/// Pinned to evaluation mode for its whole lifetime and shared read-only
/// across concurrent inference calls; only the cache that created it owns
/// it.
#[derive(Debug)]
pub struct LoadedModel {
    name: Arc<str>,
    version: Arc<str>,
    network: DetectionModel,
}

impl LoadedModel {
    pub(crate) fn new(name: Arc<str>, version: Arc<str>, network: DetectionModel) -> Self {
        Self {
            name,
            version,
            network,
        }
    }

    /// Name of the variant this model was loaded for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version tag of the variant.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The runnable network.
    pub fn network(&self) -> &DetectionModel {
        &self.network
    }
}

/// Process-wide cache of loaded models, keyed by variant name.
#[derive(Debug)]
pub struct ModelCache {
    device: Device,
    entries: Mutex<HashMap<Arc<str>, Arc<OnceCell<Arc<LoadedModel>>>>>,
    loads: AtomicUsize,
}

impl ModelCache {
    /// Creates an empty cache loading models onto `device`.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            entries: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Returns the cached model for `variant`, loading it on first use.
    ///
    /// A failed load leaves the slot empty, so a later call observes the
    /// same error path again; within a single predict call nothing is
    /// retried.
    pub fn get_or_load(&self, variant: &ModelVariant) -> DetectResult<Arc<LoadedModel>> {
        let cell = {
            let mut entries = self.entries.lock().unwrap();
            Arc::clone(entries.entry(variant.name_arc()).or_default())
        };
        cell.get_or_try_init(|| self.load(variant)).cloned()
    }

    fn load(&self, variant: &ModelVariant) -> DetectResult<Arc<LoadedModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let network = checkpoint::load_model(variant.backbone(), variant.checkpoint(), &self.device)
            .map_err(|source| DetectError::ModelLoad {
                variant: variant.name_arc(),
                source,
            })?;
        info!(
            variant = variant.name(),
            backbone = variant.backbone().as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(Arc::new(LoadedModel::new(
            variant.name_arc(),
            variant.version_arc(),
            network,
        )))
    }

    /// Number of checkpoint load attempts performed since construction.
    /// Monotonic; `reset` does not rewind it.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Drops every cached model. Intended for explicit teardown and test
    /// isolation.
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VariantConfig;
    use crate::models::architecture::{BackboneKind, build_with_varmap};
    use std::path::Path;
    use std::thread;

    fn fabricate_checkpoint(kind: BackboneKind, path: &Path) {
        let (varmap, _model) = build_with_varmap(kind, &Device::Cpu).unwrap();
        varmap.save(path).unwrap();
    }

    fn regnet_variant(path: &Path) -> ModelVariant {
        ModelVariant::from_config(VariantConfig::new("regnet", BackboneKind::RegNet, path))
            .unwrap()
    }

    #[test]
    fn concurrent_first_requests_load_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regnet_best.safetensors");
        fabricate_checkpoint(BackboneKind::RegNet, &path);

        let cache = Arc::new(ModelCache::new(Device::Cpu));
        let variant = Arc::new(regnet_variant(&path));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let variant = Arc::clone(&variant);
                thread::spawn(move || cache.get_or_load(&variant).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn reset_forces_a_fresh_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regnet_best.safetensors");
        fabricate_checkpoint(BackboneKind::RegNet, &path);

        let cache = ModelCache::new(Device::Cpu);
        let variant = regnet_variant(&path);

        cache.get_or_load(&variant).unwrap();
        cache.get_or_load(&variant).unwrap();
        assert_eq!(cache.load_count(), 1);

        cache.reset();
        cache.get_or_load(&variant).unwrap();
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn missing_checkpoint_surfaces_as_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(Device::Cpu);
        let variant = regnet_variant(&dir.path().join("absent.safetensors"));

        let error = cache.get_or_load(&variant).unwrap_err();
        assert!(matches!(error, DetectError::ModelLoad { .. }));
    }
}
