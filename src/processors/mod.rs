//! Image preprocessing for the detection engine.
//!
//! # Modules
//!
//! * `preprocess` - the canonical, deterministic image-to-tensor transform
//!   shared by every model variant

pub mod preprocess;

pub use preprocess::{IMAGE_SIZE, NORMALIZE_MEAN, NORMALIZE_STD, PreprocessedTensor, Preprocessor};
