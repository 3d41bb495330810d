//! Image loading helpers.

use crate::core::errors::{DetectError, DetectResult};
use std::path::Path;

/// Reads raw image bytes from disk.
///
/// Decoding stays inside the preprocessing pipeline so that path-based and
/// byte-based calls go through the identical transform.
///
/// # Errors
///
/// Returns a preprocessing error if the file cannot be read.
pub fn read_image_bytes(path: &Path) -> DetectResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| DetectError::preprocessing(format!("read image file {}", path.display()), e))
}
