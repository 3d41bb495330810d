//! Canonical image-to-tensor preprocessing.
//!
//! Every registered variant consumes the exact same tensor: the input bytes
//! are decoded, coerced to RGB, resized to a fixed square, scaled to
//! `[0, 1]`, and normalized with the constants used at training time. The
//! transform is a pure function of the input bytes, so confidence scores
//! from different variants always describe identical inputs.
//!
//! The image size and normalization constants below are a persisted
//! contract shared with the training pipeline. Changing any of them
//! invalidates previously trained checkpoints and must be versioned
//! explicitly, never inferred.

use crate::core::errors::{DetectError, DetectResult};
use candle_core::{Device, Tensor};
use image::DynamicImage;
use image::imageops::FilterType;

/// Square input dimension expected by every variant.
pub const IMAGE_SIZE: usize = 224;

/// Per-channel normalization mean, identical to the training transform.
pub const NORMALIZE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel normalization standard deviation, identical to the training
/// transform.
pub const NORMALIZE_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One preprocessed `(1, 3, 224, 224)` input.
///
/// Ephemeral: produced per call, consumed immediately, never persisted.
/// Cloning is cheap since the underlying storage is reference counted.
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
    tensor: Tensor,
}

impl PreprocessedTensor {
    /// The underlying input tensor.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }
}

/// Deterministic preprocessing pipeline shared by all variants.
#[derive(Debug)]
pub struct Preprocessor {
    device: Device,
    /// Per-channel scale, `(1/255) / std`.
    alpha: [f32; 3],
    /// Per-channel offset, `-mean / std`.
    beta: [f32; 3],
}

impl Preprocessor {
    /// Creates a preprocessor producing tensors on `device`.
    pub fn new(device: Device) -> Self {
        let mut alpha = [0f32; 3];
        let mut beta = [0f32; 3];
        for channel in 0..3 {
            alpha[channel] = (1.0 / 255.0) / NORMALIZE_STD[channel];
            beta[channel] = -NORMALIZE_MEAN[channel] / NORMALIZE_STD[channel];
        }
        Self {
            device,
            alpha,
            beta,
        }
    }

    /// Decodes `bytes` and produces the canonical input tensor.
    ///
    /// # Errors
    ///
    /// Returns a preprocessing error if the bytes cannot be decoded as an
    /// image or the tensor cannot be materialized.
    pub fn process(&self, bytes: &[u8]) -> DetectResult<PreprocessedTensor> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| DetectError::preprocessing("decode image bytes", e))?;
        self.process_image(image)
    }

    /// Runs the resize and normalization steps on an already decoded image.
    pub fn process_image(&self, image: DynamicImage) -> DetectResult<PreprocessedTensor> {
        let size = IMAGE_SIZE as u32;
        // Coerce to three channels before resizing so the interpolation
        // always runs over RGB data; Triangle matches the bilinear filter
        // used by the training transform.
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8())
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        let mut data = vec![0f32; 3 * IMAGE_SIZE * IMAGE_SIZE];
        for (channel, plane) in data.chunks_mut(IMAGE_SIZE * IMAGE_SIZE).enumerate() {
            for (index, pixel) in rgb.pixels().enumerate() {
                plane[index] = pixel[channel] as f32 * self.alpha[channel] + self.beta[channel];
            }
        }

        let tensor = Tensor::from_vec(data, (1, 3, IMAGE_SIZE, IMAGE_SIZE), &self.device)
            .map_err(|e| DetectError::preprocessing("build input tensor", e))?;
        Ok(PreprocessedTensor { tensor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn output_has_canonical_shape() {
        let preprocessor = Preprocessor::new(Device::Cpu);
        let tensor = preprocessor.process(&png_bytes(320, 200)).unwrap();
        assert_eq!(tensor.tensor().dims(), &[1, 3, IMAGE_SIZE, IMAGE_SIZE]);
    }

    #[test]
    fn identical_bytes_produce_bit_identical_tensors() {
        let preprocessor = Preprocessor::new(Device::Cpu);
        let bytes = png_bytes(97, 43);
        let first = preprocessor.process(&bytes).unwrap();
        let second = preprocessor.process(&bytes).unwrap();

        let first: Vec<f32> = first.tensor().flatten_all().unwrap().to_vec1().unwrap();
        let second: Vec<f32> = second.tensor().flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn normalization_applies_training_constants() {
        let preprocessor = Preprocessor::new(Device::Cpu);
        let white = RgbImage::from_pixel(64, 64, image::Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(white)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let tensor = preprocessor.process(&bytes).unwrap();
        let values: Vec<f32> = tensor.tensor().flatten_all().unwrap().to_vec1().unwrap();
        let plane = IMAGE_SIZE * IMAGE_SIZE;
        for channel in 0..3 {
            let expected = (1.0 - NORMALIZE_MEAN[channel]) / NORMALIZE_STD[channel];
            let actual = values[channel * plane];
            assert!(
                (actual - expected).abs() < 1e-5,
                "channel {channel}: expected {expected}, got {actual}"
            );
        }
    }

    #[test]
    fn undecodable_bytes_are_a_preprocessing_error() {
        let preprocessor = Preprocessor::new(Device::Cpu);
        let error = preprocessor.process(b"not an image").unwrap_err();
        assert!(matches!(error, DetectError::Preprocessing { .. }));
    }
}
