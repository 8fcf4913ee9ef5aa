//! Service configuration
//!
//! Settings are layered: built-in defaults, then an optional JSON file, then
//! `SMART_BGREMOVE_*` environment variables, then command-line flags.

use crate::classifier::ClassifierThresholds;
use crate::error::{BgRemovalError, Result};
use crate::postprocess::DEFAULT_ALPHA_THRESHOLD;
use crate::processor::ProcessorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by all environment overrides
pub const ENV_PREFIX: &str = "SMART_BGREMOVE_";

/// Environment variable overriding the models directory
pub const MODELS_DIR_ENV: &str = "SMART_BGREMOVE_MODELS_DIR";

/// Default upload limit (10 MiB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Runtime configuration for the HTTP service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub app_name: String,
    pub host: String,
    pub port: u16,

    /// Mount point for all API routes, e.g. `/api/v1`
    pub api_prefix: String,

    /// Largest accepted upload in bytes
    pub max_file_size: usize,

    /// Accepted upload extensions, lowercase without the dot
    pub allowed_extensions: Vec<String>,

    pub icon_alpha_threshold: u8,

    pub storage_enabled: bool,
    pub storage_path: PathBuf,

    /// Delete stored files older than this many days, checked hourly
    pub storage_retention_days: Option<u64>,

    /// Directory holding `{model_id}.onnx` files
    pub models_dir: PathBuf,

    pub session_load_timeout_secs: u64,
    pub removal_timeout_secs: u64,

    pub classifier: ClassifierThresholds,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            app_name: "Background Removal Service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "/api/v1".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: ["jpg", "jpeg", "png", "webp"].map(String::from).to_vec(),
            icon_alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            storage_enabled: true,
            storage_path: PathBuf::from("./storage"),
            storage_retention_days: None,
            models_dir: default_models_dir(),
            session_load_timeout_secs: 300,
            removal_timeout_secs: 120,
            classifier: ClassifierThresholds::default(),
        }
    }
}

/// Models directory from the environment, else the user cache directory
#[must_use]
pub fn default_models_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(MODELS_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }

    dirs::cache_dir()
        .map(|cache| cache.join("smart-bgremove").join("models"))
        .unwrap_or_else(|| PathBuf::from("./models"))
}

impl ServiceConfig {
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Load from a JSON file; omitted fields keep their defaults
    ///
    /// # Errors
    /// - `Io` when the file cannot be read
    /// - `InvalidConfig` when the JSON is malformed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;

        serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!("Failed to parse '{}': {e}", path.display()))
        })
    }

    /// Apply `SMART_BGREMOVE_*` overrides from the process environment
    ///
    /// # Errors
    /// - `InvalidConfig` when a variable cannot be parsed
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` in place of the process environment
    ///
    /// # Errors
    /// - `InvalidConfig` when a variable cannot be parsed
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = parse_env("PORT", &port)?;
        }
        if let Some(prefix) = var("API_PREFIX") {
            self.api_prefix = prefix;
        }
        if let Some(size) = var("MAX_FILE_SIZE") {
            self.max_file_size = parse_env("MAX_FILE_SIZE", &size)?;
        }
        if let Some(path) = var("STORAGE_PATH") {
            self.storage_path = PathBuf::from(path);
        }
        if let Some(enabled) = var("ENABLE_STORAGE") {
            self.storage_enabled = parse_bool("ENABLE_STORAGE", &enabled)?;
        }
        if let Some(dir) = var("MODELS_DIR") {
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(threshold) = var("ICON_ALPHA_THRESHOLD") {
            self.icon_alpha_threshold = parse_env("ICON_ALPHA_THRESHOLD", &threshold)?;
        }

        Ok(self)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - `InvalidConfig` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(BgRemovalError::config_value_error("port", self.port, "1-65535"));
        }
        if !self.api_prefix.is_empty() && (!self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/')) {
            return Err(BgRemovalError::invalid_config(format!(
                "Invalid api_prefix '{}': must be empty or start with '/' and not end with '/'",
                self.api_prefix
            )));
        }
        if self.max_file_size == 0 {
            return Err(BgRemovalError::config_value_error("max_file_size", 0, "> 0 bytes"));
        }
        if self.allowed_extensions.is_empty() {
            return Err(BgRemovalError::invalid_config("allowed_extensions must not be empty"));
        }
        if self.session_load_timeout_secs == 0 {
            return Err(BgRemovalError::config_value_error("session_load_timeout_secs", 0, "> 0"));
        }
        if self.removal_timeout_secs == 0 {
            return Err(BgRemovalError::config_value_error("removal_timeout_secs", 0, "> 0"));
        }
        if self.storage_retention_days == Some(0) {
            return Err(BgRemovalError::config_value_error("storage_retention_days", 0, "> 0"));
        }
        Ok(())
    }

    /// `host:port` for the listener
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `filename` carries an accepted extension (case-insensitive)
    #[must_use]
    pub fn is_extension_allowed(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)))
    }

    /// Pipeline settings derived from this configuration
    ///
    /// # Errors
    /// - `InvalidConfig` when a timeout is zero
    pub fn processor_config(&self) -> Result<ProcessorConfig> {
        ProcessorConfig::builder()
            .icon_alpha_threshold(self.icon_alpha_threshold)
            .session_load_timeout(Duration::from_secs(self.session_load_timeout_secs))
            .removal_timeout(Duration::from_secs(self.removal_timeout_secs))
            .classifier(self.classifier.clone())
            .build()
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BgRemovalError::invalid_config(format!("Invalid {ENV_PREFIX}{name} '{value}': {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BgRemovalError::invalid_config(format!(
            "Invalid {ENV_PREFIX}{name} '{value}': expected a boolean"
        ))),
    }
}

/// Builder for [`ServiceConfig`]
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn api_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.api_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn icon_alpha_threshold(mut self, threshold: u8) -> Self {
        self.config.icon_alpha_threshold = threshold;
        self
    }

    #[must_use]
    pub fn storage_enabled(mut self, enabled: bool) -> Self {
        self.config.storage_enabled = enabled;
        self
    }

    #[must_use]
    pub fn storage_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.storage_path = path.into();
        self
    }

    #[must_use]
    pub fn storage_retention_days(mut self, days: Option<u64>) -> Self {
        self.config.storage_retention_days = days;
        self
    }

    #[must_use]
    pub fn models_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.models_dir = dir.into();
        self
    }

    #[must_use]
    pub fn session_load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.session_load_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn removal_timeout_secs(mut self, secs: u64) -> Self {
        self.config.removal_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn classifier(mut self, thresholds: ClassifierThresholds) -> Self {
        self.config.classifier = thresholds;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - `InvalidConfig` when validation fails
    pub fn build(self) -> Result<ServiceConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
