//! Shared application state

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::inference::SessionFactory;
use crate::processor::BackgroundRemovalProcessor;
use crate::services::FileStorageService;
use std::sync::Arc;

/// State handed to every handler through `State<Arc<AppState>>`
#[derive(Debug)]
pub struct AppState {
    pub config: ServiceConfig,
    pub processor: Arc<BackgroundRemovalProcessor>,
    /// Present only when storage is enabled
    pub storage: Option<FileStorageService>,
}

impl AppState {
    /// Build the processor and, if enabled, the storage tree
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration fails validation
    /// - `Io` when storage directories cannot be created
    pub fn from_config(config: ServiceConfig, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        config.validate()?;

        let processor = Arc::new(BackgroundRemovalProcessor::new(config.processor_config()?, factory));
        let storage = if config.storage_enabled {
            Some(FileStorageService::new(config.storage_path.clone())?)
        } else {
            None
        };

        Ok(Self {
            config,
            processor,
            storage,
        })
    }
}
