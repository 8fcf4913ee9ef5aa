#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Smart Background Removal
//!
//! Background removal service that picks a segmentation model per image by
//! first classifying the image as an icon, sticker, cartoon or photo, then
//! post-processes the alpha channel for either icon output (hard edges,
//! auto-cropped) or standard output (soft edges, auto-cropped).
//!
//! ## Pipeline
//!
//! 1. [`features::FeatureExtractor`] derives colour, edge and texture statistics
//! 2. [`classifier::Classifier`] maps them onto an [`ImageType`] with fixed rules
//! 3. [`models::ModelSelector`] picks a model for the category
//! 4. [`session_cache::SessionCache`] loads that model once per process
//! 5. [`postprocess::AlphaPostProcessor`] hardens, crops and encodes the cutout
//!
//! [`processor::BackgroundRemovalProcessor`] drives the whole flow and
//! [`server`] exposes it over HTTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "tract")]
//! use smart_bgremove::{backends::TractSessionFactory, BackgroundRemovalProcessor, ProcessorConfig};
//! use std::sync::Arc;
//!
//! # #[cfg(feature = "tract")]
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let factory = Arc::new(TractSessionFactory::new("/var/lib/models"));
//! let processor = BackgroundRemovalProcessor::new(ProcessorConfig::default(), factory);
//!
//! let result = processor.process_icon(&upload).await?;
//! println!("{} -> {} bytes", result.image_type, result.bytes.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Classification only
//!
//! ```rust,no_run
//! # fn example(bytes: &[u8]) -> smart_bgremove::Result<()> {
//! let image_type = smart_bgremove::detect_image_type(bytes)?;
//! println!("detected {image_type}");
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust ONNX backend
//! - `cli` (default): Server binary, argument parsing and subscriber setup
//! - `webp-support` (default): WebP input support
//! - `tracing-json`: JSON log output

pub mod backends;
pub mod classifier;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod inference;
pub mod models;
pub mod postprocess;
pub mod processor;
pub mod server;
pub mod services;
pub mod session_cache;
pub mod tracing_config;
pub mod utils;

// Public API exports
pub use classifier::{Classification, Classifier, ClassifierThresholds, ImageType};
pub use config::ServiceConfig;
pub use error::{BgRemovalError, Result};
pub use features::{FeatureExtractor, FeatureVector};
pub use inference::{ModelSession, SessionFactory};
pub use models::{ModelSelector, DEFAULT_MODEL, ICON_MODEL};
pub use postprocess::{AlphaPostProcessor, BoundingBox, OutputFormat, DEFAULT_ALPHA_THRESHOLD};
pub use processor::{BackgroundRemovalProcessor, ProcessedImage, ProcessorConfig, ProcessorConfigBuilder};
pub use services::FileStorageService;
pub use session_cache::{SessionCache, SessionCacheStats};
pub use tracing_config::{TracingConfig, TracingFormat};

/// Classify encoded image bytes with the default thresholds
///
/// Synchronous and CPU-bound; async callers should prefer
/// [`BackgroundRemovalProcessor::classify_bytes`].
///
/// # Errors
/// - `Decode` when the bytes are not a supported image
/// - `InvalidImage` for zero-area images
pub fn detect_image_type(image_bytes: &[u8]) -> Result<ImageType> {
    let features = FeatureExtractor::extract(image_bytes)?;
    Ok(Classifier::default().classify(&features))
}
