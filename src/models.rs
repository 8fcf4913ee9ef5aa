//! Model selection and per-model preprocessing profiles

use crate::classifier::ImageType;
use crate::error::{BgRemovalError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Model used when a category has no dedicated choice
pub const DEFAULT_MODEL: &str = "isnet-general-use";

/// Fast model with crisp masks for simple graphics
pub const ICON_MODEL: &str = "u2net";

/// Longest accepted model identifier
pub const MAX_MODEL_ID_LEN: usize = 64;

/// Maps an image category to the backend model best suited for it
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector;

impl ModelSelector {
    /// Select the model identifier for a category
    ///
    /// Every category except ICON uses [`DEFAULT_MODEL`]; new categories
    /// must be added here explicitly.
    #[must_use]
    pub fn select_model(image_type: ImageType) -> &'static str {
        let model = match image_type {
            ImageType::Icon => ICON_MODEL,
            ImageType::Sticker | ImageType::Cartoon | ImageType::Photo => DEFAULT_MODEL,
        };
        info!(model_id = model, image_type = %image_type, "Selected model");
        model
    }
}

/// Validate a caller-supplied model identifier
///
/// Identifiers become file names under the models directory, so only
/// `[A-Za-z0-9._-]` is accepted and `.`/`..` are rejected.
pub fn validate_model_id(model_id: &str) -> Result<()> {
    if model_id.is_empty() || model_id.len() > MAX_MODEL_ID_LEN {
        return Err(BgRemovalError::model_load(
            model_id,
            format!("identifier must be 1-{MAX_MODEL_ID_LEN} characters"),
        ));
    }
    if model_id == "." || model_id == ".." {
        return Err(BgRemovalError::model_load(model_id, "reserved identifier"));
    }
    if let Some(c) = model_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(BgRemovalError::model_load(
            model_id,
            format!("invalid character '{c}' in identifier"),
        ));
    }
    Ok(())
}

/// Tensor preprocessing parameters for a model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input edge length in pixels
    pub target_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Known model families and their input conventions
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub model_id: String,
    pub preprocessing: PreprocessingConfig,
}

impl ModelProfile {
    /// Profile for a model identifier; unknown identifiers get the ISNet layout
    #[must_use]
    pub fn for_model(model_id: &str) -> Self {
        let preprocessing = match model_id {
            "u2net" | "u2netp" | "u2net_human_seg" | "silueta" => PreprocessingConfig {
                target_size: 320,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            "isnet-anime" => PreprocessingConfig {
                target_size: 1024,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: [1.0, 1.0, 1.0],
            },
            _ => PreprocessingConfig {
                target_size: 1024,
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        };

        Self {
            model_id: model_id.to_string(),
            preprocessing,
        }
    }

    /// Location of the ONNX file for this model under `models_dir`
    #[must_use]
    pub fn model_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(format!("{}.onnx", self.model_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_model_mapping() {
        assert_eq!(ModelSelector::select_model(ImageType::Icon), "u2net");
        assert_eq!(ModelSelector::select_model(ImageType::Sticker), "isnet-general-use");
        assert_eq!(ModelSelector::select_model(ImageType::Cartoon), "isnet-general-use");
        assert_eq!(ModelSelector::select_model(ImageType::Photo), DEFAULT_MODEL);
    }

    #[test]
    fn test_select_model_is_deterministic() {
        for image_type in ImageType::ALL {
            assert_eq!(
                ModelSelector::select_model(image_type),
                ModelSelector::select_model(image_type)
            );
        }
    }

    #[test]
    fn test_validate_model_id() {
        assert!(validate_model_id("u2net").is_ok());
        assert!(validate_model_id("isnet-general-use").is_ok());
        assert!(validate_model_id("model_v1.2").is_ok());

        assert!(validate_model_id("").is_err());
        assert!(validate_model_id(".").is_err());
        assert!(validate_model_id("..").is_err());
        assert!(validate_model_id("../etc/passwd").is_err());
        assert!(validate_model_id("a b").is_err());
        assert!(validate_model_id(&"x".repeat(65)).is_err());
        assert!(validate_model_id(&"x".repeat(64)).is_ok());

        match validate_model_id("bad/name") {
            Err(BgRemovalError::ModelLoad { model_id, .. }) => assert_eq!(model_id, "bad/name"),
            other => panic!("expected ModelLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_model_profiles() {
        let u2net = ModelProfile::for_model("u2net");
        assert_eq!(u2net.preprocessing.target_size, 320);
        assert_eq!(u2net.preprocessing.normalization_mean, IMAGENET_MEAN);

        let isnet = ModelProfile::for_model("isnet-general-use");
        assert_eq!(isnet.preprocessing.target_size, 1024);
        assert_eq!(isnet.preprocessing.normalization_mean, [0.5, 0.5, 0.5]);

        let unknown = ModelProfile::for_model("custom-model");
        assert_eq!(unknown.preprocessing, isnet.preprocessing);
    }

    #[test]
    fn test_model_path() {
        let profile = ModelProfile::for_model("u2net");
        assert_eq!(
            profile.model_path(Path::new("/models")),
            PathBuf::from("/models/u2net.onnx")
        );
    }
}
