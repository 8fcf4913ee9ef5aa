//! Rule-based image type classification
//!
//! Maps a [`FeatureVector`] onto one of four categories. Rules are evaluated
//! first-match-wins in a fixed order (ICON, STICKER, CARTOON, PHOTO); the
//! order is the tie-break policy when a vector satisfies several rules, and
//! PHOTO is the terminal fallback so classification is total.

use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Semantic image category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Small, simple graphics (logos, icons, symbols)
    Icon,
    /// Flat coloured graphics with outlines (stickers, emoji)
    Sticker,
    /// Illustrated content (anime, cartoon, characters)
    Cartoon,
    /// Real photographs (portraits, products, landscapes)
    Photo,
}

impl ImageType {
    /// All categories in rule evaluation order
    pub const ALL: [ImageType; 4] = [Self::Icon, Self::Sticker, Self::Cartoon, Self::Photo];

    /// Lowercase name used in headers and storage paths
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Icon => "icon",
            Self::Sticker => "sticker",
            Self::Cartoon => "cartoon",
            Self::Photo => "photo",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable rule thresholds
///
/// The defaults were tuned empirically and are treated as the contract
/// values; any subset can be overridden from the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    pub icon_pixel_limit: u64,
    pub icon_strong_edge_min: f64,
    pub icon_hist_peak_max: usize,
    pub icon_sat_std_max: f64,
    pub sticker_strong_edge_min: f64,
    pub sticker_sat_mean_min: f64,
    pub sticker_sat_std_max: f64,
    pub sticker_texture_max: f64,
    pub sticker_hist_peak_max: usize,
    pub cartoon_strong_edge_min: f64,
    pub cartoon_texture_max: f64,
    pub cartoon_sat_mean_min: f64,
    pub cartoon_sat_std_max: f64,
    pub cartoon_edge_density_max: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            icon_pixel_limit: 250_000,
            icon_strong_edge_min: 0.015,
            icon_hist_peak_max: 10,
            icon_sat_std_max: 75.0,
            sticker_strong_edge_min: 0.012,
            sticker_sat_mean_min: 50.0,
            sticker_sat_std_max: 70.0,
            sticker_texture_max: 45.0,
            sticker_hist_peak_max: 15,
            cartoon_strong_edge_min: 0.008,
            cartoon_texture_max: 50.0,
            cartoon_sat_mean_min: 60.0,
            cartoon_sat_std_max: 80.0,
            cartoon_edge_density_max: 0.2,
        }
    }
}

/// Pure rule engine over feature vectors
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    thresholds: ClassifierThresholds,
}

impl Classifier {
    #[must_use]
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// Classify a feature vector; never fails
    #[must_use]
    pub fn classify(&self, features: &FeatureVector) -> ImageType {
        let image_type = if self.is_icon(features) {
            ImageType::Icon
        } else if self.is_sticker(features) {
            ImageType::Sticker
        } else if self.is_cartoon(features) {
            ImageType::Cartoon
        } else {
            ImageType::Photo
        };

        info!(image_type = %image_type, "Detected image type");
        image_type
    }

    fn is_icon(&self, f: &FeatureVector) -> bool {
        let t = &self.thresholds;
        f.total_pixels < t.icon_pixel_limit
            && f.strong_edge_density > t.icon_strong_edge_min
            && f.hue_histogram_peak_count <= t.icon_hist_peak_max
            && f.saturation_std < t.icon_sat_std_max
    }

    fn is_sticker(&self, f: &FeatureVector) -> bool {
        let t = &self.thresholds;
        f.strong_edge_density > t.sticker_strong_edge_min
            && f.saturation_mean > t.sticker_sat_mean_min
            && f.saturation_std < t.sticker_sat_std_max
            && f.texture_complexity < t.sticker_texture_max
            && f.hue_histogram_peak_count <= t.sticker_hist_peak_max
    }

    fn is_cartoon(&self, f: &FeatureVector) -> bool {
        let t = &self.thresholds;
        let outlined = f.strong_edge_density > t.cartoon_strong_edge_min;
        let smooth_and_colourful =
            f.texture_complexity < t.cartoon_texture_max && f.saturation_mean > t.cartoon_sat_mean_min;

        (outlined || smooth_and_colourful)
            && f.saturation_std < t.cartoon_sat_std_max
            && f.edge_density < t.cartoon_edge_density_max
    }
}

/// Outcome of the classify step inside a pipeline
///
/// Extraction failures do not abort the pipeline; they are reported as a
/// `Fallback` carrying the reason so callers can observe the degradation.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Detected {
        image_type: ImageType,
        features: FeatureVector,
    },
    Fallback {
        image_type: ImageType,
        reason: String,
    },
}

impl Classification {
    /// Fallback to PHOTO with the given reason
    pub fn fallback<S: Into<String>>(reason: S) -> Self {
        Self::Fallback {
            image_type: ImageType::Photo,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn image_type(&self) -> ImageType {
        match self {
            Self::Detected { image_type, .. } | Self::Fallback { image_type, .. } => *image_type,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A vector that matches no rule: large, no outlines, busy, noisy colours
    fn photo_like() -> FeatureVector {
        FeatureVector {
            width: 1920,
            height: 1080,
            total_pixels: 1920 * 1080,
            saturation_mean: 40.0,
            saturation_std: 90.0,
            value_mean: 120.0,
            edge_density: 0.3,
            strong_edge_density: 0.001,
            hue_histogram_peak_count: 30,
            texture_complexity: 95.0,
        }
    }

    fn icon_like() -> FeatureVector {
        FeatureVector {
            width: 300,
            height: 300,
            total_pixels: 90_000,
            saturation_mean: 80.0,
            saturation_std: 40.0,
            value_mean: 200.0,
            edge_density: 0.05,
            strong_edge_density: 0.03,
            hue_histogram_peak_count: 3,
            texture_complexity: 30.0,
        }
    }

    #[test]
    fn test_default_thresholds_are_contract_values() {
        let t = ClassifierThresholds::default();
        assert_eq!(t.icon_pixel_limit, 250_000);
        assert!((t.icon_strong_edge_min - 0.015).abs() < f64::EPSILON);
        assert_eq!(t.icon_hist_peak_max, 10);
        assert!((t.icon_sat_std_max - 75.0).abs() < f64::EPSILON);
        assert!((t.sticker_strong_edge_min - 0.012).abs() < f64::EPSILON);
        assert!((t.sticker_sat_mean_min - 50.0).abs() < f64::EPSILON);
        assert!((t.sticker_sat_std_max - 70.0).abs() < f64::EPSILON);
        assert!((t.sticker_texture_max - 45.0).abs() < f64::EPSILON);
        assert_eq!(t.sticker_hist_peak_max, 15);
        assert!((t.cartoon_strong_edge_min - 0.008).abs() < f64::EPSILON);
        assert!((t.cartoon_texture_max - 50.0).abs() < f64::EPSILON);
        assert!((t.cartoon_sat_mean_min - 60.0).abs() < f64::EPSILON);
        assert!((t.cartoon_sat_std_max - 80.0).abs() < f64::EPSILON);
        assert!((t.cartoon_edge_density_max - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_icon_rule() {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(&icon_like()), ImageType::Icon);

        // Too many pixels: no longer an icon, but still outlined and flat
        let mut large = icon_like();
        large.total_pixels = 250_000;
        assert_eq!(classifier.classify(&large), ImageType::Sticker);
    }

    #[test]
    fn test_icon_wins_over_sticker() {
        let classifier = Classifier::default();
        let features = icon_like();
        // Satisfies the sticker rule as well
        assert!(classifier.is_sticker(&features));
        assert_eq!(classifier.classify(&features), ImageType::Icon);
    }

    #[test]
    fn test_sticker_rule() {
        let classifier = Classifier::default();
        let mut f = photo_like();
        f.strong_edge_density = 0.013;
        f.saturation_mean = 55.0;
        f.saturation_std = 60.0;
        f.texture_complexity = 40.0;
        f.hue_histogram_peak_count = 15;
        assert_eq!(classifier.classify(&f), ImageType::Sticker);

        f.hue_histogram_peak_count = 16;
        f.edge_density = 0.1;
        // Falls through to cartoon: outlined, consistent colours, few edges
        assert_eq!(classifier.classify(&f), ImageType::Cartoon);
    }

    #[test]
    fn test_cartoon_rule_branches() {
        let classifier = Classifier::default();

        // Outline branch
        let mut outlined = photo_like();
        outlined.strong_edge_density = 0.009;
        outlined.saturation_std = 79.0;
        outlined.edge_density = 0.19;
        assert_eq!(classifier.classify(&outlined), ImageType::Cartoon);

        // Smooth and colourful branch, no outlines
        let mut smooth = photo_like();
        smooth.strong_edge_density = 0.0;
        smooth.texture_complexity = 49.0;
        smooth.saturation_mean = 61.0;
        smooth.saturation_std = 50.0;
        smooth.edge_density = 0.05;
        assert_eq!(classifier.classify(&smooth), ImageType::Cartoon);

        // Too many edges overall
        smooth.edge_density = 0.2;
        assert_eq!(classifier.classify(&smooth), ImageType::Photo);
    }

    #[test]
    fn test_boundaries_are_strict() {
        let classifier = Classifier::default();
        let mut f = icon_like();
        f.strong_edge_density = 0.015;
        // Not an icon at exactly the threshold; still a sticker
        assert_eq!(classifier.classify(&f), ImageType::Sticker);

        let mut f = icon_like();
        f.saturation_std = 75.0;
        assert_ne!(classifier.classify(&f), ImageType::Icon);
    }

    #[test]
    fn test_photo_fallback() {
        assert_eq!(Classifier::default().classify(&photo_like()), ImageType::Photo);
    }

    #[test]
    fn test_classification_is_total_over_grid() {
        let classifier = Classifier::default();
        let strong = [0.0, 0.008, 0.009, 0.012, 0.013, 0.015, 0.02];
        let sat_std = [10.0, 69.9, 70.0, 75.0, 80.0, 120.0];
        let texture = [10.0, 45.0, 49.9, 90.0];
        let peaks = [0, 10, 11, 15, 16, 40];

        for &s in &strong {
            for &sd in &sat_std {
                for &tx in &texture {
                    for &p in &peaks {
                        let mut f = icon_like();
                        f.strong_edge_density = s;
                        f.saturation_std = sd;
                        f.texture_complexity = tx;
                        f.hue_histogram_peak_count = p;
                        let result = classifier.classify(&f);
                        assert!(ImageType::ALL.contains(&result));

                        let expected = if classifier.is_icon(&f) {
                            ImageType::Icon
                        } else if classifier.is_sticker(&f) {
                            ImageType::Sticker
                        } else if classifier.is_cartoon(&f) {
                            ImageType::Cartoon
                        } else {
                            ImageType::Photo
                        };
                        assert_eq!(result, expected);
                    }
                }
            }
        }
    }

    #[test]
    fn test_thresholds_partial_override() {
        let thresholds: ClassifierThresholds =
            serde_json::from_str(r#"{"icon_pixel_limit": 1000000}"#).unwrap();
        assert_eq!(thresholds.icon_pixel_limit, 1_000_000);
        assert_eq!(thresholds.sticker_hist_peak_max, 15);

        let classifier = Classifier::new(thresholds);
        let mut f = icon_like();
        f.total_pixels = 500_000;
        assert_eq!(classifier.classify(&f), ImageType::Icon);
    }

    #[test]
    fn test_image_type_names() {
        assert_eq!(ImageType::Icon.to_string(), "icon");
        assert_eq!(ImageType::Photo.as_str(), "photo");
        assert_eq!(serde_json::to_string(&ImageType::Sticker).unwrap(), "\"sticker\"");
    }

    #[test]
    fn test_classification_fallback() {
        let c = Classification::fallback("decoder panicked");
        assert_eq!(c.image_type(), ImageType::Photo);
        assert!(c.is_fallback());

        let c = Classification::Detected {
            image_type: ImageType::Icon,
            features: icon_like(),
        };
        assert_eq!(c.image_type(), ImageType::Icon);
        assert!(!c.is_fallback());
    }
}
