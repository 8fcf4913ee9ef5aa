//! Alpha channel post-processing and output encoding
//!
//! Every operation returns a new buffer; inputs are never modified.

use crate::error::{BgRemovalError, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

/// Alpha cut-off used for icon output
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 200;

/// Encoded output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
        }
    }
}

/// Inclusive-exclusive pixel rectangle `[x, x + width) × [y, y + height)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Stateless alpha transforms
pub struct AlphaPostProcessor;

impl AlphaPostProcessor {
    /// Binarise alpha: 255 where `alpha > threshold`, 0 elsewhere
    ///
    /// RGB values are kept as-is, including under fully transparent pixels.
    #[must_use]
    pub fn hard_edge(image: &RgbaImage, threshold: u8) -> RgbaImage {
        let mut output = image.clone();
        for pixel in output.pixels_mut() {
            pixel.0[3] = if pixel.0[3] > threshold { 255 } else { 0 };
        }
        output
    }

    /// Tight box around pixels with non-zero alpha, `None` if fully transparent
    #[must_use]
    pub fn bounding_box(image: &RgbaImage) -> Option<BoundingBox> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut found = false;

        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel.0[3] > 0 {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        found.then(|| BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }

    /// Crop to the bounding box of non-transparent pixels
    ///
    /// A fully transparent image is returned unchanged at its original size.
    #[must_use]
    pub fn auto_crop(image: &RgbaImage) -> RgbaImage {
        match Self::bounding_box(image) {
            Some(bbox) => image::imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image(),
            None => image.clone(),
        }
    }

    /// Encode an RGBA image
    ///
    /// Compression settings are fixed per `optimize` flag so identical input
    /// always yields identical bytes.
    ///
    /// # Errors
    /// - `Internal` when the encoder rejects the buffer
    pub fn encode(image: &RgbaImage, format: OutputFormat, optimize: bool) -> Result<Vec<u8>> {
        match format {
            OutputFormat::Png => {
                let compression = if optimize {
                    CompressionType::Best
                } else {
                    CompressionType::Default
                };

                let mut buffer = Vec::new();
                PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive)
                    .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)
                    .map_err(|e| BgRemovalError::internal(format!("PNG encoding failed: {e}")))?;
                Ok(buffer)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient_alpha() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 7, (x * 16 + y) as u8]))
    }

    #[test]
    fn test_hard_edge_is_binary() {
        let input = gradient_alpha();
        let output = AlphaPostProcessor::hard_edge(&input, DEFAULT_ALPHA_THRESHOLD);

        for (before, after) in input.pixels().zip(output.pixels()) {
            let expected = if before.0[3] > 200 { 255 } else { 0 };
            assert_eq!(after.0[3], expected);
            assert_eq!(before.0[..3], after.0[..3]);
        }
    }

    #[test]
    fn test_hard_edge_threshold_is_exclusive() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([1, 2, 3, 200]));
        image.put_pixel(1, 0, Rgba([1, 2, 3, 201]));

        let output = AlphaPostProcessor::hard_edge(&image, 200);
        assert_eq!(output.get_pixel(0, 0).0, [1, 2, 3, 0]);
        assert_eq!(output.get_pixel(1, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn test_auto_crop_to_content() {
        let mut image = RgbaImage::new(20, 10);
        image.put_pixel(3, 2, Rgba([255, 0, 0, 255]));
        image.put_pixel(12, 7, Rgba([0, 255, 0, 1]));

        let bbox = AlphaPostProcessor::bounding_box(&image).unwrap();
        assert_eq!(bbox, BoundingBox { x: 3, y: 2, width: 10, height: 6 });

        let cropped = AlphaPostProcessor::auto_crop(&image);
        assert_eq!(cropped.dimensions(), (10, 6));
        assert_eq!(cropped.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(cropped.get_pixel(9, 5).0, [0, 255, 0, 1]);
    }

    #[test]
    fn test_auto_crop_idempotent() {
        let mut image = RgbaImage::new(30, 30);
        for x in 5..25 {
            image.put_pixel(x, 10, Rgba([9, 9, 9, 128]));
        }

        let once = AlphaPostProcessor::auto_crop(&image);
        let twice = AlphaPostProcessor::auto_crop(&once);
        assert_eq!(once, twice);
        assert_eq!(once.dimensions(), (20, 1));
    }

    #[test]
    fn test_auto_crop_fully_transparent() {
        let image = RgbaImage::from_pixel(7, 5, Rgba([50, 60, 70, 0]));
        assert!(AlphaPostProcessor::bounding_box(&image).is_none());

        let cropped = AlphaPostProcessor::auto_crop(&image);
        assert_eq!(cropped, image);
    }

    #[test]
    fn test_encode_png_deterministic() {
        let image = gradient_alpha();
        let a = AlphaPostProcessor::encode(&image, OutputFormat::Png, true).unwrap();
        let b = AlphaPostProcessor::encode(&image, OutputFormat::Png, true).unwrap();
        assert_eq!(a, b);

        let decoded = image::load_from_memory(&a).unwrap().to_rgba8();
        assert_eq!(decoded, image);

        let fast = AlphaPostProcessor::encode(&image, OutputFormat::Png, false).unwrap();
        assert_eq!(image::load_from_memory(&fast).unwrap().to_rgba8(), image);
    }

    #[test]
    fn test_output_format_metadata() {
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
    }
}
