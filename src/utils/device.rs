//! Compute-device selection helpers.

use crate::core::errors::{DetectError, DetectResult};
use candle_core::Device;

#[cfg(not(feature = "cuda"))]
fn cuda_not_enabled() -> DetectError {
    DetectError::configuration("CUDA support not enabled; compile with --features cuda")
}

/// Parses a device string and creates a Candle [`Device`].
///
/// # Supported formats
///
/// - `"cpu"` - CPU device
/// - `"cuda"` or `"gpu"` - CUDA device 0
/// - `"cuda:N"` - CUDA device N
///
/// # Errors
///
/// Returns a configuration error if the device string is invalid, CUDA is
/// requested without the `cuda` feature, or CUDA device creation fails.
pub fn parse_device(device_str: &str) -> DetectResult<Device> {
    let device_str = device_str.to_lowercase();
    match device_str.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => new_cuda(0),
        other => {
            if let Some(index) = other.strip_prefix("cuda:") {
                let index: usize = index.parse().map_err(|_| {
                    DetectError::configuration(format!("invalid CUDA device index in '{other}'"))
                })?;
                new_cuda(index)
            } else {
                Err(DetectError::configuration(format!(
                    "unsupported device '{other}'"
                )))
            }
        }
    }
}

#[cfg(feature = "cuda")]
fn new_cuda(index: usize) -> DetectResult<Device> {
    Device::new_cuda(index)
        .map_err(|e| DetectError::configuration(format!("failed to create CUDA device: {e}")))
}

#[cfg(not(feature = "cuda"))]
fn new_cuda(_index: usize) -> DetectResult<Device> {
    Err(cuda_not_enabled())
}
