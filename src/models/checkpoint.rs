//! Checkpoint resolution.
//!
//! A checkpoint is a safetensors file holding a trained model's parameter
//! values. Two container shapes are accepted transparently:
//!
//! * a raw mapping of parameter names to tensors, or
//! * a wrapped training container in which the parameters appear under the
//!   distinguished [`STATE_DICT_KEY`] prefix alongside other metadata
//!   entries (epoch counters, optimizer state), which are ignored.
//!
//! Detection is structural (presence of the prefix), never filename-based.
//! The container format is a persisted contract: changing it invalidates
//! previously trained checkpoints and must be versioned explicitly.

use crate::models::architecture::{self, BackboneKind, DetectionModel};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Distinguished key marking the wrapped container shape.
pub const STATE_DICT_KEY: &str = "model_state_dict";

/// Enum representing the ways a checkpoint can fail to load.
///
/// All of these are scoped to a single variant and are not retryable: a
/// missing file or a drifted shape cannot succeed on a second attempt.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The checkpoint file does not exist.
    #[error("checkpoint file not found: {path}")]
    Missing {
        /// The path that was probed.
        path: PathBuf,
    },

    /// The file exists but is not a readable safetensors container.
    #[error("unreadable checkpoint container: {path}")]
    Unreadable {
        /// The path that was read.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: candle_core::Error,
    },

    /// The container holds no parameter tensors in either accepted shape.
    #[error("checkpoint contains no parameter tensors: {path}")]
    EmptyContainer {
        /// The path that was read.
        path: PathBuf,
    },

    /// A parameter required by the architecture is absent from the
    /// checkpoint. Signals architecture/checkpoint drift.
    #[error("checkpoint is missing parameter '{name}'")]
    MissingParameter {
        /// Name of the absent parameter.
        name: String,
    },

    /// The checkpoint carries a parameter the architecture does not define.
    /// Signals architecture/checkpoint drift.
    #[error("checkpoint has unexpected parameter '{name}'")]
    UnexpectedParameter {
        /// Name of the extra parameter.
        name: String,
    },

    /// A parameter's serialized shape does not match the architecture.
    /// Signals architecture/checkpoint drift.
    #[error("shape mismatch for parameter '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Name of the drifted parameter.
        name: String,
        /// Shape the architecture defines.
        expected: Vec<usize>,
        /// Shape found in the checkpoint.
        actual: Vec<usize>,
    },

    /// Building the architecture over the checkpoint tensors failed.
    #[error("failed to build architecture from checkpoint tensors")]
    Build(#[source] candle_core::Error),
}

/// Reads `path` and returns the parameter mapping, unwrapping the
/// [`STATE_DICT_KEY`] container when present.
fn read_state_dict(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>, CheckpointError> {
    if !path.exists() {
        return Err(CheckpointError::Missing {
            path: path.to_path_buf(),
        });
    }
    let tensors = candle_core::safetensors::load(path, device).map_err(|source| {
        CheckpointError::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let prefix = format!("{STATE_DICT_KEY}.");
    let wrapped = tensors.keys().any(|key| key.starts_with(&prefix));
    let state: HashMap<String, Tensor> = if wrapped {
        debug!(path = %path.display(), "unwrapping training container");
        tensors
            .into_iter()
            .filter_map(|(key, tensor)| {
                key.strip_prefix(&prefix)
                    .map(|name| (name.to_string(), tensor))
            })
            .collect()
    } else {
        tensors
    };

    if state.is_empty() {
        return Err(CheckpointError::EmptyContainer {
            path: path.to_path_buf(),
        });
    }
    Ok(state)
}

/// Validates `state` against the parameter manifest of `kind`.
fn validate_state_dict(
    kind: BackboneKind,
    state: &HashMap<String, Tensor>,
) -> Result<(), CheckpointError> {
    let expected = architecture::parameter_shapes(kind).map_err(CheckpointError::Build)?;
    for (name, shape) in &expected {
        let tensor = state
            .get(name)
            .ok_or_else(|| CheckpointError::MissingParameter { name: name.clone() })?;
        if tensor.dims() != shape.as_slice() {
            return Err(CheckpointError::ShapeMismatch {
                name: name.clone(),
                expected: shape.clone(),
                actual: tensor.dims().to_vec(),
            });
        }
    }
    for name in state.keys() {
        if !expected.contains_key(name) {
            return Err(CheckpointError::UnexpectedParameter { name: name.clone() });
        }
    }
    Ok(())
}

/// Loads `kind`'s architecture from the checkpoint at `path`.
///
/// The returned model is built from plain tensors, so no gradient graph is
/// ever recorded, and it has no training forward path: it stays in
/// evaluation mode for its whole lifetime.
pub fn load_model(
    kind: BackboneKind,
    path: &Path,
    device: &Device,
) -> Result<DetectionModel, CheckpointError> {
    let state = read_state_dict(path, device)?;
    validate_state_dict(kind, &state)?;
    let state: HashMap<String, Tensor> = state
        .into_iter()
        .map(|(name, tensor)| Ok((name, tensor.to_dtype(DType::F32)?)))
        .collect::<candle_core::Result<_>>()
        .map_err(CheckpointError::Build)?;
    let vb = VarBuilder::from_tensors(state, DType::F32, device);
    DetectionModel::new(kind, vb).map_err(CheckpointError::Build)
}
