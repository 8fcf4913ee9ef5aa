//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error kinds surfaced by the classification and removal pipeline
///
/// Every variant is recoverable at the request boundary: a failing request
/// never poisons the session cache or affects other requests.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Image bytes could not be decoded as a supported raster format
    #[error("Decode error: {0}")]
    Decode(String),

    /// Input is empty or structurally invalid
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Backend session construction failed for a model identifier
    #[error("Failed to load model '{model_id}': {reason}")]
    ModelLoad { model_id: String, reason: String },

    /// Backend invocation failed or timed out
    #[error("Background removal failed: {0}")]
    RemovalBackend(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new model load error naming the requested model
    pub fn model_load<M: Into<String>, S: Into<String>>(model_id: M, reason: S) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new removal backend error
    pub fn removal_backend<S: Into<String>>(msg: S) -> Self {
        Self::RemovalBackend(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether the error was caused by the client's input rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidImage(_))
    }

    /// Stable machine-readable code for the error kind
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::InvalidImage(_) => "INVALID_IMAGE",
            Self::ModelLoad { .. } => "MODEL_LOAD_ERROR",
            Self::RemovalBackend(_) => "REMOVAL_BACKEND_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
