//! Utility functions for the detection engine.
//!
//! # Modules
//!
//! * `device` - compute-device string parsing
//! * `image` - image file loading helpers

pub mod device;
pub mod image;

pub use device::parse_device;
pub use image::read_image_bytes;
