//! Tract backend for ONNX segmentation models
//!
//! Pure Rust inference with no native dependencies. Each session owns one
//! optimised runnable plan built from `{models_dir}/{model_id}.onnx` with a
//! fixed `[1, 3, S, S]` input, where `S` comes from the model profile.

use crate::error::{BgRemovalError, Result};
use crate::inference::{ModelSession, SessionFactory};
use crate::models::{validate_model_id, ModelProfile};
use crate::utils::{mask_from_tensor, ImagePreprocessor};
use image::{ImageFormat, RgbaImage};
use instant::Instant;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_onnx::prelude::*;
use tracing::{debug, info};

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Builds Tract sessions from ONNX files in a models directory
#[derive(Debug, Clone)]
pub struct TractSessionFactory {
    models_dir: PathBuf,
}

impl TractSessionFactory {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(models_dir: P) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    fn load_model(model_path: &Path, model_id: &str, target_size: usize) -> Result<TractModel> {
        let load_error = |stage: &str, e: TractError| BgRemovalError::model_load(model_id, format!("{stage}: {e}"));

        onnx()
            .model_for_path(model_path)
            .map_err(|e| load_error("failed to read ONNX model", e))?
            .with_input_fact(0, f32::fact([1, 3, target_size, target_size]).into())
            .map_err(|e| load_error("failed to set input shape", e))?
            .into_optimized()
            .map_err(|e| load_error("failed to optimize model", e))?
            .into_runnable()
            .map_err(|e| load_error("failed to create runnable model", e))
    }
}

impl SessionFactory for TractSessionFactory {
    fn create_session(&self, model_id: &str) -> Result<Arc<dyn ModelSession>> {
        validate_model_id(model_id)?;

        let profile = ModelProfile::for_model(model_id);
        let model_path = profile.model_path(&self.models_dir);
        if !model_path.is_file() {
            return Err(BgRemovalError::model_load(
                model_id,
                format!("model file not found at '{}'", model_path.display()),
            ));
        }

        let start = Instant::now();
        let target_size = profile.preprocessing.target_size as usize;
        let model = Self::load_model(&model_path, model_id, target_size)?;

        info!(
            model_id,
            path = %model_path.display(),
            input_size = target_size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tract session initialized"
        );

        Ok(Arc::new(TractSession { profile, model }))
    }
}

/// A runnable Tract plan plus the preprocessing it expects
#[derive(Debug)]
pub struct TractSession {
    profile: ModelProfile,
    model: TractModel,
}

impl TractSession {
    fn infer(&self, image: &RgbaImage) -> Result<image::GrayImage> {
        let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        let (input, letterbox) = ImagePreprocessor::preprocess(&rgb, &self.profile.preprocessing)?;

        let input_slice = input
            .as_slice()
            .ok_or_else(|| BgRemovalError::internal("Input tensor is not contiguous"))?;
        let input_tensor = Tensor::from_shape(input.shape(), input_slice)
            .map_err(|e| BgRemovalError::removal_backend(format!("Failed to build input tensor: {e}")))?;

        let start = Instant::now();
        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::removal_backend(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .first()
            .ok_or_else(|| BgRemovalError::removal_backend("No output tensor found"))?;
        let data = output
            .as_slice::<f32>()
            .map_err(|e| BgRemovalError::removal_backend(format!("Unexpected output tensor type: {e}")))?;

        debug!(
            model_id = %self.profile.model_id,
            output_shape = ?output.shape(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tract inference completed"
        );

        mask_from_tensor(data, output.shape(), image.dimensions(), &letterbox)
    }
}

impl ModelSession for TractSession {
    fn model_id(&self) -> &str {
        &self.profile.model_id
    }

    fn remove(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| BgRemovalError::decode(e.to_string()))?
            .to_rgba8();

        let mask = self.infer(&image)?;

        let mut cutout = image;
        for (pixel, alpha) in cutout.pixels_mut().zip(mask.pixels()) {
            pixel.0[3] = alpha.0[0];
        }

        let mut buffer = Vec::new();
        cutout
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| BgRemovalError::removal_backend(format!("PNG encoding failed: {e}")))?;
        Ok(buffer)
    }
}
