//! Model construction and checkpoint resolution.
//!
//! This module owns everything needed to turn a registered variant into a
//! runnable network:
//!
//! * `backbone` - the closed set of feature-extraction topologies
//! * `head` - the shared two-class classifier head
//! * `architecture` - assembly of backbone + head and the parameter manifest
//! * `checkpoint` - safetensors resolution with container-shape tolerance

pub mod architecture;
pub mod backbone;
pub mod checkpoint;
pub mod head;

pub use architecture::{BackboneKind, DetectionModel, NUM_CLASSES};
pub use checkpoint::{CheckpointError, STATE_DICT_KEY, load_model};

/// Epsilon used by every batch-norm layer in the crate. Part of the
/// checkpoint compatibility contract.
pub(crate) const BN_EPS: f64 = 1e-5;
