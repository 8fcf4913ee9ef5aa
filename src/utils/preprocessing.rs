//! Tensor preprocessing and mask recovery for segmentation models
//!
//! Images are letterboxed into the model's square input: resized with the
//! aspect ratio preserved, centred on a padded canvas, and normalised into
//! an NCHW tensor. [`mask_from_tensor`] applies the inverse mapping to bring
//! the predicted mask back to the original image size.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::{Array4, ArrayView4};

/// Padding colour for the letterbox canvas
pub const PADDING_COLOR: [u8; 3] = [255, 255, 255];

/// Letterbox geometry shared by the forward and inverse transforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    /// Geometry for fitting `(width, height)` into a `target_size` square
    #[must_use]
    pub fn fit(width: u32, height: u32, target_size: u32) -> Self {
        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);

        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
        }
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox and normalise an RGB image into a `[1, 3, S, S]` tensor
    ///
    /// # Errors
    /// - `InvalidImage` for zero-area input
    pub fn preprocess(image: &RgbImage, config: &PreprocessingConfig) -> Result<(Array4<f32>, Letterbox)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_image("Image has zero area"));
        }

        let target_size = config.target_size;
        let letterbox = Letterbox::fit(width, height, target_size);

        let resized = image::imageops::resize(
            image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(target_size, target_size, image::Rgb(PADDING_COLOR));
        image::imageops::overlay(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        Ok((Self::canvas_to_tensor(&canvas, config), letterbox))
    }

    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = (f32::from(pixel.0[channel]) / 255.0 - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = value;
                }
            }
        }

        tensor
    }
}

/// Recover an 8-bit mask at the original size from a `[1, C, H, W]` prediction
///
/// Only the first channel is used. Values are min-max normalised before
/// quantisation, so the strongest prediction maps to 255.
///
/// # Errors
/// - `RemovalBackend` when the tensor shape is not 4-D with batch size 1
pub fn mask_from_tensor(
    data: &[f32],
    shape: &[usize],
    original_dimensions: (u32, u32),
    letterbox: &Letterbox,
) -> Result<GrayImage> {
    let dims: [usize; 4] = shape
        .try_into()
        .map_err(|_| BgRemovalError::removal_backend(format!("Expected 4D output tensor, got {}D", shape.len())))?;
    if dims[0] != 1 || dims[1] == 0 {
        return Err(BgRemovalError::removal_backend(format!(
            "Invalid output tensor shape {shape:?}"
        )));
    }

    let tensor = ArrayView4::from_shape(dims, data)
        .map_err(|e| BgRemovalError::removal_backend(format!("Output tensor size mismatch: {e}")))?;
    let (mask_height, mask_width) = (dims[2], dims[3]);

    let plane = tensor.slice(ndarray::s![0, 0, .., ..]);
    let (min, max) = plane
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;

    let (orig_width, orig_height) = original_dimensions;
    let mask = GrayImage::from_fn(orig_width, orig_height, |x, y| {
        let tensor_x = (x as f32 * letterbox.scale).round() as usize + letterbox.offset_x as usize;
        let tensor_y = (y as f32 * letterbox.scale).round() as usize + letterbox.offset_y as usize;

        let value = if tensor_x < mask_width && tensor_y < mask_height {
            plane.get([tensor_y, tensor_x]).copied().unwrap_or(min)
        } else {
            min
        };

        let normalized = if range > f32::EPSILON { (value - min) / range } else { 0.0 };
        Luma([(normalized.clamp(0.0, 1.0) * 255.0).round() as u8])
    });

    Ok(mask)
}
