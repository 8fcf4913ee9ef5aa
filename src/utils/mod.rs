//! Shared utilities

pub mod preprocessing;

pub use preprocessing::{mask_from_tensor, ImagePreprocessor, Letterbox};
