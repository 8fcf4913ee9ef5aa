//! Background removal orchestrator
//!
//! `BackgroundRemovalProcessor` composes feature extraction, classification,
//! model selection, the session cache and alpha post-processing into the
//! icon and standard pipelines, plus a raw pass-through that runs a named
//! model without post-processing. CPU-bound stages run on the blocking pool.

use crate::{
    classifier::{Classification, Classifier, ClassifierThresholds, ImageType},
    error::{BgRemovalError, Result},
    features::FeatureExtractor,
    inference::{ModelSession, SessionFactory},
    models::ModelSelector,
    postprocess::{AlphaPostProcessor, OutputFormat, DEFAULT_ALPHA_THRESHOLD},
    session_cache::{SessionCache, DEFAULT_SESSION_LOAD_TIMEOUT},
};
use image::DynamicImage;
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default upper bound on a single backend invocation
pub const DEFAULT_REMOVAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Alpha cut-off applied by the icon pipeline
    pub icon_alpha_threshold: u8,
    /// Use maximum PNG compression for pipeline output
    pub optimize_output: bool,
    pub session_load_timeout: Duration,
    pub removal_timeout: Duration,
    pub classifier: ClassifierThresholds,
}

impl ProcessorConfig {
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            icon_alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            optimize_output: true,
            session_load_timeout: DEFAULT_SESSION_LOAD_TIMEOUT,
            removal_timeout: DEFAULT_REMOVAL_TIMEOUT,
            classifier: ClassifierThresholds::default(),
        }
    }
}

/// Builder for [`ProcessorConfig`]
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn icon_alpha_threshold(mut self, threshold: u8) -> Self {
        self.config.icon_alpha_threshold = threshold;
        self
    }

    #[must_use]
    pub fn optimize_output(mut self, optimize: bool) -> Self {
        self.config.optimize_output = optimize;
        self
    }

    #[must_use]
    pub fn session_load_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_load_timeout = timeout;
        self
    }

    #[must_use]
    pub fn removal_timeout(mut self, timeout: Duration) -> Self {
        self.config.removal_timeout = timeout;
        self
    }

    #[must_use]
    pub fn classifier(mut self, thresholds: ClassifierThresholds) -> Self {
        self.config.classifier = thresholds;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - `InvalidConfig` when a timeout is zero
    pub fn build(self) -> Result<ProcessorConfig> {
        if self.config.session_load_timeout.is_zero() {
            return Err(BgRemovalError::config_value_error("session_load_timeout", 0, "> 0s"));
        }
        if self.config.removal_timeout.is_zero() {
            return Err(BgRemovalError::config_value_error("removal_timeout", 0, "> 0s"));
        }
        Ok(self.config)
    }
}

/// Output of the icon and standard pipelines
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    /// Encoded PNG bytes
    pub bytes: Vec<u8>,
    /// Category that drove model selection
    pub image_type: ImageType,
}

impl ProcessedImage {
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipeline {
    Icon,
    Standard,
}

/// Orchestrates classification, removal and post-processing
#[derive(Debug)]
pub struct BackgroundRemovalProcessor {
    config: ProcessorConfig,
    classifier: Classifier,
    sessions: SessionCache,
}

impl BackgroundRemovalProcessor {
    /// Create a processor whose sessions come from `factory`
    #[must_use]
    pub fn new(config: ProcessorConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let sessions = SessionCache::with_timeout(factory, config.session_load_timeout);
        Self {
            classifier: Classifier::new(config.classifier.clone()),
            config,
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Remove the background for icon output: hard alpha edges, cropped
    ///
    /// # Errors
    /// - `InvalidImage` for empty or undecodable input
    /// - `ModelLoad` when the selected model cannot be loaded
    /// - `RemovalBackend` when the backend fails or returns unusable output
    #[instrument(skip(self, image_bytes), fields(input_size = image_bytes.len()))]
    pub async fn process_icon(&self, image_bytes: &[u8]) -> Result<ProcessedImage> {
        self.process_classified(image_bytes, Pipeline::Icon).await
    }

    /// Remove the background keeping soft alpha edges, cropped
    ///
    /// # Errors
    /// Same as [`Self::process_icon`].
    #[instrument(skip(self, image_bytes), fields(input_size = image_bytes.len()))]
    pub async fn process_standard(&self, image_bytes: &[u8]) -> Result<ProcessedImage> {
        self.process_classified(image_bytes, Pipeline::Standard).await
    }

    /// Run `model_id` directly and return its output unmodified
    ///
    /// # Errors
    /// - `InvalidImage` for empty, truncated or undecodable input
    /// - `ModelLoad` for invalid or unloadable model identifiers
    /// - `RemovalBackend` when the backend fails or returns nothing
    #[instrument(skip(self, image_bytes), fields(input_size = image_bytes.len()))]
    pub async fn process_raw(&self, image_bytes: &[u8], model_id: &str) -> Result<Vec<u8>> {
        let data: Arc<[u8]> = Arc::from(image_bytes);
        let image = Self::decode_input(Arc::clone(&data)).await?;
        debug!(width = image.width(), height = image.height(), "Input decoded");

        let session = self.sessions.get_session(model_id).await?;
        let output = self.run_removal(session, data).await?;

        info!(model_id, output_size = output.len(), "Background removed");
        Ok(output)
    }

    /// Decode and classify without running a backend
    ///
    /// Feature extraction failures yield [`Classification::Fallback`].
    ///
    /// # Errors
    /// - `InvalidImage` for empty or undecodable input
    pub async fn classify_bytes(&self, image_bytes: &[u8]) -> Result<Classification> {
        let image = Self::decode_input(Arc::from(image_bytes)).await?;
        Ok(self.classify_image(image).await)
    }

    async fn process_classified(&self, image_bytes: &[u8], pipeline: Pipeline) -> Result<ProcessedImage> {
        let total_start = Instant::now();
        let data: Arc<[u8]> = Arc::from(image_bytes);

        let image = Self::decode_input(Arc::clone(&data)).await?;
        let image_type = self.classify_image(image).await.image_type();

        let model_id = ModelSelector::select_model(image_type);
        let session = self.sessions.get_session(model_id).await?;
        let removed = self.run_removal(session, data).await?;

        let threshold = (pipeline == Pipeline::Icon).then_some(self.config.icon_alpha_threshold);
        let optimize = self.config.optimize_output;
        let bytes = tokio::task::spawn_blocking(move || Self::postprocess(&removed, threshold, optimize))
            .await
            .map_err(|e| BgRemovalError::internal(format!("Post-processing task failed: {e}")))??;

        info!(
            pipeline = ?pipeline,
            image_type = %image_type,
            model_id,
            output_size = bytes.len(),
            elapsed_ms = total_start.elapsed().as_millis() as u64,
            "Pipeline completed"
        );

        Ok(ProcessedImage { bytes, image_type })
    }

    async fn decode_input(data: Arc<[u8]>) -> Result<DynamicImage> {
        if data.is_empty() {
            return Err(BgRemovalError::invalid_image("Empty image data"));
        }

        tokio::task::spawn_blocking(move || {
            image::load_from_memory(&data)
                .map_err(|e| BgRemovalError::invalid_image(format!("Could not decode image: {e}")))
        })
        .await
        .map_err(|e| BgRemovalError::internal(format!("Decode task failed: {e}")))?
    }

    async fn classify_image(&self, image: DynamicImage) -> Classification {
        let extraction = tokio::task::spawn_blocking(move || FeatureExtractor::extract_image(&image)).await;

        match extraction {
            Ok(Ok(features)) => Classification::Detected {
                image_type: self.classifier.classify(&features),
                features,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Feature extraction failed, falling back to photo");
                Classification::fallback(e.to_string())
            },
            Err(join_error) => {
                warn!(error = %join_error, "Feature extraction aborted, falling back to photo");
                Classification::fallback(join_error.to_string())
            },
        }
    }

    async fn run_removal(&self, session: Arc<dyn ModelSession>, data: Arc<[u8]>) -> Result<Vec<u8>> {
        let model_id = session.model_id().to_string();
        let start = Instant::now();
        let handle = tokio::task::spawn_blocking(move || session.remove(&data));

        let output = match tokio::time::timeout(self.config.removal_timeout, handle).await {
            Ok(Ok(Ok(output))) => output,
            Ok(Ok(Err(e @ BgRemovalError::RemovalBackend(_)))) => return Err(e),
            Ok(Ok(Err(e))) => return Err(BgRemovalError::removal_backend(e.to_string())),
            Ok(Err(join_error)) => {
                return Err(BgRemovalError::removal_backend(format!(
                    "Backend task aborted: {join_error}"
                )))
            },
            Err(_) => {
                return Err(BgRemovalError::removal_backend(format!(
                    "Backend timed out after {}s",
                    self.config.removal_timeout.as_secs_f64()
                )))
            },
        };

        if output.is_empty() {
            return Err(BgRemovalError::removal_backend(format!(
                "Model '{model_id}' returned empty output"
            )));
        }

        debug!(
            model_id = %model_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Backend invocation completed"
        );
        Ok(output)
    }

    fn postprocess(removed: &[u8], hard_edge_threshold: Option<u8>, optimize: bool) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(removed)
            .map_err(|e| BgRemovalError::removal_backend(format!("Backend output is not an image: {e}")))?
            .to_rgba8();

        let edged = match hard_edge_threshold {
            Some(threshold) => AlphaPostProcessor::hard_edge(&decoded, threshold),
            None => decoded,
        };
        let cropped = AlphaPostProcessor::auto_crop(&edged);

        AlphaPostProcessor::encode(&cropped, OutputFormat::Png, optimize)
    }
}
