//! Layering of configuration sources for the binary

use crate::cli::main_impl::Cli;
use crate::config::ServiceConfig;
use anyhow::{Context, Result};

/// Builds the effective [`ServiceConfig`] from file, environment and flags
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Defaults, then `--config` file, then environment, then flags
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServiceConfig> {
        let base = match &cli.config {
            Some(path) => ServiceConfig::from_file(path)
                .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
            None => ServiceConfig::default(),
        };

        let config = base
            .apply_env()
            .context("Invalid environment override")?;
        let config = Self::apply_flags(config, cli);

        config.validate().context("Configuration failed validation")?;
        Ok(config)
    }

    fn apply_flags(mut config: ServiceConfig, cli: &Cli) -> ServiceConfig {
        if let Some(host) = &cli.host {
            config.host.clone_from(host);
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(prefix) = &cli.api_prefix {
            config.api_prefix.clone_from(prefix);
        }
        if let Some(size) = cli.max_file_size {
            config.max_file_size = size;
        }
        if let Some(threshold) = cli.icon_alpha_threshold {
            config.icon_alpha_threshold = threshold;
        }
        if let Some(dir) = &cli.models_dir {
            config.models_dir.clone_from(dir);
        }
        if let Some(path) = &cli.storage_path {
            config.storage_path.clone_from(path);
        }
        if cli.no_storage {
            config.storage_enabled = false;
        }
        if cli.storage_retention_days.is_some() {
            config.storage_retention_days = cli.storage_retention_days;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 9000, "host": "127.0.0.1", "icon_alpha_threshold": 150}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = Cli::parse_from(["smart-bgremove", "--config", &path, "--port", "9500", "--no-storage"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.port, 9500);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.icon_alpha_threshold, 150);
        assert!(!config.storage_enabled);
    }

    #[test]
    fn test_invalid_flag_value_fails_validation() {
        let cli = Cli::parse_from(["smart-bgremove", "--api-prefix", "no-slash"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["smart-bgremove", "-vv", "--backend", "mock", "--log-format", "compact"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.backend, crate::cli::BackendKind::Mock);
        assert_eq!(cli.log_format, crate::tracing_config::TracingFormat::Compact);
    }
}
