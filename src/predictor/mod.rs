//! Forward-pass execution for loaded model variants.
//!
//! # Modules
//!
//! * `executor` - runs one evaluation-mode forward pass and shapes the
//!   softmax output into a structured prediction

pub mod executor;
