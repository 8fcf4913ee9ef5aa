//! Image descriptor extraction for type classification
//!
//! Computes a fixed [`FeatureVector`] from a decoded image: HSV colour
//! statistics, edge densities at two Canny sensitivities, hue histogram peak
//! count and Sobel-derived texture complexity. Every field is a pure function
//! of the pixel grid, so repeated extraction on identical input yields
//! identical descriptors.
//!
//! The classifier thresholds were tuned against OpenCV, so the detectors
//! follow its conventions: Canny runs on the unblurred image with L1
//! gradient magnitude and replicated borders, the texture Sobel reflects
//! borders (`BORDER_REFLECT_101`), and hue 180 falls outside the histogram.

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Number of hue buckets (8-bit hue encoding, degrees / 2)
pub const HUE_BINS: usize = 180;

/// Peaks must exceed this fraction of the tallest hue bucket to be counted
pub const HUE_PEAK_RATIO: f64 = 0.1;

/// Hysteresis thresholds for the general-purpose edge detector
pub const MODERATE_EDGE_THRESHOLDS: (f32, f32) = (100.0, 200.0);

/// Hysteresis thresholds for the outline detector
pub const STRONG_EDGE_THRESHOLDS: (f32, f32) = (200.0, 300.0);

/// Statistical and structural descriptors of one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub width: u32,
    pub height: u32,
    pub total_pixels: u64,
    /// Mean of the HSV saturation channel (0-255 scale)
    pub saturation_mean: f64,
    /// Population standard deviation of the HSV saturation channel
    pub saturation_std: f64,
    /// Mean of the HSV value channel (0-255 scale)
    pub value_mean: f64,
    /// Fraction of pixels marked by the moderate edge detector
    pub edge_density: f64,
    /// Fraction of pixels marked by the strong (outline) edge detector
    pub strong_edge_density: f64,
    /// Local maxima in the hue histogram above 10% of its peak
    pub hue_histogram_peak_count: usize,
    /// Standard deviation of the Sobel gradient magnitude
    pub texture_complexity: f64,
}

/// 8-bit HSV pixel using the conventional encoding: hue in `0..=180`
/// (degrees halved), saturation and value in `0..=255`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv8 {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv8 {
    /// Convert one RGB pixel
    #[must_use]
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = f32::from(max - min);

        let s = if max == 0 {
            0
        } else {
            (255.0 * delta / f32::from(max)).round() as u8
        };

        let h = if max == min {
            0
        } else {
            let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
            let degrees = if max == r {
                60.0 * (gf - bf) / delta
            } else if max == g {
                120.0 + 60.0 * (bf - rf) / delta
            } else {
                240.0 + 60.0 * (rf - gf) / delta
            };
            let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
            // Just below 360 degrees rounds to 180, one past the last bucket
            (degrees / 2.0).round() as u8
        };

        Self { h, s, v: max }
    }
}

/// Luma conversion with the 0.299/0.587/0.114 weights in 14-bit fixed point
#[must_use]
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        let (r, g, b) = (u32::from(p[0]), u32::from(p[1]), u32::from(p[2]));
        Luma([((r * 4899 + g * 9617 + b * 1868 + 8192) >> 14) as u8])
    })
}

/// Stateless descriptor extractor
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Decode raw image bytes and compute their descriptors
    ///
    /// # Errors
    /// - `Decode` when the bytes are not a supported raster format
    /// - `InvalidImage` when the decoded image has no pixels
    pub fn extract(image_bytes: &[u8]) -> Result<FeatureVector> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| BgRemovalError::decode(format!("Failed to decode image: {e}")))?;
        Self::extract_image(&image)
    }

    /// Compute descriptors for an already decoded image
    ///
    /// # Errors
    /// - `InvalidImage` when the image has zero width or height
    #[instrument(skip(image), fields(width = image.width(), height = image.height()))]
    pub fn extract_image(image: &DynamicImage) -> Result<FeatureVector> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_image(format!(
                "Image has no pixels ({width}x{height})"
            )));
        }
        let total_pixels = u64::from(width) * u64::from(height);

        let colour = ColourStats::from_rgb(&rgb);
        let gray = rgb_to_gray(&rgb);

        let edge_density = canny_density(&gray, MODERATE_EDGE_THRESHOLDS);
        let strong_edge_density = canny_density(&gray, STRONG_EDGE_THRESHOLDS);
        let hue_histogram_peak_count = count_histogram_peaks(&colour.hue_histogram, HUE_PEAK_RATIO);
        let texture_complexity = gradient_magnitude_std(&gray);

        let features = FeatureVector {
            width,
            height,
            total_pixels,
            saturation_mean: colour.saturation_mean,
            saturation_std: colour.saturation_std,
            value_mean: colour.value_mean,
            edge_density,
            strong_edge_density,
            hue_histogram_peak_count,
            texture_complexity,
        };

        debug!(
            size = %format!("{width}x{height}"),
            total_pixels,
            sat_mean = format_args!("{:.1}", features.saturation_mean),
            sat_std = format_args!("{:.1}", features.saturation_std),
            edge = format_args!("{:.3}", features.edge_density),
            strong_edge = format_args!("{:.3}", features.strong_edge_density),
            peaks = features.hue_histogram_peak_count,
            texture = format_args!("{:.1}", features.texture_complexity),
            "Extracted image features"
        );

        Ok(features)
    }
}

/// Colour statistics gathered in a single pass over the HSV conversion
struct ColourStats {
    saturation_mean: f64,
    saturation_std: f64,
    value_mean: f64,
    hue_histogram: [u64; HUE_BINS],
}

impl ColourStats {
    fn from_rgb(rgb: &RgbImage) -> Self {
        let mut hue_histogram = [0u64; HUE_BINS];
        let mut saturation = Vec::with_capacity(rgb.as_raw().len() / 3);
        let mut value_sum = 0.0f64;

        for pixel in rgb.pixels() {
            let hsv = Hsv8::from_rgb(pixel[0], pixel[1], pixel[2]);
            if let Some(bucket) = hue_histogram.get_mut(usize::from(hsv.h)) {
                *bucket += 1;
            }
            saturation.push(f64::from(hsv.s));
            value_sum += f64::from(hsv.v);
        }

        let (saturation_mean, saturation_std) = mean_and_std(&saturation);
        let value_mean = if saturation.is_empty() {
            0.0
        } else {
            value_sum / saturation.len() as f64
        };

        Self {
            saturation_mean,
            saturation_std,
            value_mean,
            hue_histogram,
        }
    }
}

/// Fraction of pixels the Canny detector marks as edges
fn canny_density(gray: &GrayImage, (low, high): (f32, f32)) -> f64 {
    let edges = canny_l1(gray, low, high);
    let total = edges.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let marked = edges.as_raw().iter().filter(|&&v| v > 0).count();
    marked as f64 / total as f64
}

/// tan(22.5 deg) in Q15 fixed point
const TAN_22_5_Q15: i64 = 13_573;

const NOT_EDGE: u8 = 0;
const CANDIDATE: u8 = 1;
const EDGE: u8 = 2;

/// Canny edge map with OpenCV's defaults (3x3 aperture, L1 gradient)
///
/// No smoothing is applied. Gradients use replicated borders, suppression
/// quantises directions into four sectors with the same asymmetric
/// comparisons, and hysteresis grows strong edges through 8-connected
/// candidates. Edge pixels are 255.
#[must_use]
pub fn canny_l1(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let (low, high) = (low.floor() as i32, high.floor() as i32);

    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let magnitude: Vec<i32> = gx
        .as_raw()
        .iter()
        .zip(gy.as_raw())
        .map(|(&dx, &dy)| i32::from(dx).abs() + i32::from(dy).abs())
        .collect();

    let (w, h) = (i64::from(width), i64::from(height));
    let index = |x: i64, y: i64| -> Option<usize> {
        (x >= 0 && y >= 0 && x < w && y < h).then(|| (y * w + x) as usize)
    };
    // Outside the image the magnitude reads as zero
    let mag_at = |x: i64, y: i64| index(x, y).and_then(|i| magnitude.get(i)).copied().unwrap_or(0);

    let mut state = vec![NOT_EDGE; magnitude.len()];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let Some(i) = index(x, y) else { continue };
            let m = mag_at(x, y);
            if m <= low {
                continue;
            }

            let dx = i64::from(gx.as_raw().get(i).copied().unwrap_or(0));
            let dy = i64::from(gy.as_raw().get(i).copied().unwrap_or(0));
            let ax = dx.abs();
            let ay = dy.abs() << 15;
            let tg22x = ax * TAN_22_5_Q15;
            let tg67x = tg22x + (ax << 16);

            let is_maximum = if ay < tg22x {
                m > mag_at(x - 1, y) && m >= mag_at(x + 1, y)
            } else if ay > tg67x {
                m > mag_at(x, y - 1) && m >= mag_at(x, y + 1)
            } else {
                let s = if (dx ^ dy) < 0 { -1 } else { 1 };
                m > mag_at(x - s, y - 1) && m > mag_at(x + s, y + 1)
            };
            if !is_maximum {
                continue;
            }

            if let Some(cell) = state.get_mut(i) {
                if m > high {
                    *cell = EDGE;
                    stack.push((x, y));
                } else {
                    *cell = CANDIDATE;
                }
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        for (nx, ny) in [
            (x - 1, y - 1),
            (x, y - 1),
            (x + 1, y - 1),
            (x - 1, y),
            (x + 1, y),
            (x - 1, y + 1),
            (x, y + 1),
            (x + 1, y + 1),
        ] {
            if let Some(cell) = index(nx, ny).and_then(|i| state.get_mut(i)) {
                if *cell == CANDIDATE {
                    *cell = EDGE;
                    stack.push((nx, ny));
                }
            }
        }
    }

    let pixels = state.into_iter().map(|s| if s == EDGE { 255 } else { 0 }).collect();
    GrayImage::from_raw(width, height, pixels).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Count interior local maxima taller than `ratio` times the global maximum
#[must_use]
pub fn count_histogram_peaks(histogram: &[u64], ratio: f64) -> usize {
    let Some(&max) = histogram.iter().max() else {
        return 0;
    };
    let floor = max as f64 * ratio;

    histogram
        .windows(3)
        .filter(|w| match w {
            [prev, cur, next] => cur > prev && cur > next && *cur as f64 > floor,
            _ => false,
        })
        .count()
}

/// Standard deviation of the 3x3 Sobel gradient magnitude
fn gradient_magnitude_std(gray: &GrayImage) -> f64 {
    mean_and_std(&gradient_magnitudes(gray)).1
}

/// Sobel gradient magnitude per pixel with reflected borders
fn gradient_magnitudes(gray: &GrayImage) -> Vec<f64> {
    let (width, height) = gray.dimensions();
    let padded = pad_reflect_101(gray);
    let gx = horizontal_sobel(&padded);
    let gy = vertical_sobel(&padded);

    let mut magnitudes = Vec::with_capacity(width as usize * height as usize);
    for y in 1..=height {
        for x in 1..=width {
            let dx = f64::from(gx.get_pixel(x, y)[0]);
            let dy = f64::from(gy.get_pixel(x, y)[0]);
            magnitudes.push((dx * dx + dy * dy).sqrt());
        }
    }
    magnitudes
}

/// One-pixel border mirrored without repeating the edge (`dcb|abcd|cba`)
fn pad_reflect_101(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width + 2, height + 2, |x, y| {
        *gray.get_pixel(reflect_101(x, width), reflect_101(y, height))
    })
}

/// Map a padded coordinate (offset by one) back into `0..len`
fn reflect_101(padded: u32, len: u32) -> u32 {
    if len <= 1 {
        return 0;
    }
    match padded {
        0 => 1,
        p if p > len => len - 2,
        p => p - 1,
    }
}

/// Mean and population standard deviation
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
