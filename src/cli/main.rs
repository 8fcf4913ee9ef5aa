//! Command-line parsing and service startup

use crate::cli::config::CliConfigBuilder;
use crate::config::ServiceConfig;
use crate::inference::SessionFactory;
use crate::server::{self, AppState};
use crate::tracing_config::{TracingConfig, TracingFormat};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Backend used to construct model sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Tract ONNX inference over `{models_dir}/{model}.onnx`
    Tract,
    /// Deterministic colour-key backend, for local testing only
    Mock,
}

/// Background removal HTTP service with image-type detection
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "smart-bgremove")]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, value_name = "PATH", env = "SMART_BGREMOVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Mount point for API routes (e.g. /api/v1)
    #[arg(long)]
    pub api_prefix: Option<String>,

    /// Maximum upload size in bytes
    #[arg(long, value_name = "BYTES")]
    pub max_file_size: Option<usize>,

    /// Alpha cut-off for icon output (0-255)
    #[arg(long)]
    pub icon_alpha_threshold: Option<u8>,

    /// Directory holding `<model>.onnx` files
    #[arg(long, value_name = "PATH")]
    pub models_dir: Option<PathBuf>,

    /// Root directory for stored input/output pairs
    #[arg(long, value_name = "PATH")]
    pub storage_path: Option<PathBuf>,

    /// Disable storing processed pairs
    #[arg(long)]
    pub no_storage: bool,

    /// Delete stored files older than this many days
    #[arg(long, value_name = "DAYS")]
    pub storage_retention_days: Option<u64>,

    /// Session backend
    #[arg(long, value_enum, default_value_t = BackendKind::Tract)]
    pub backend: BackendKind,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value_t = TracingFormat::Console)]
    pub log_format: TracingFormat,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Parse arguments, build the service and serve until shutdown
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format)
        .with_rust_log()
        .init()
        .context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let factory = create_factory(cli.backend, &config)?;
    info!(
        app = %config.app_name,
        backend = ?cli.backend,
        version = env!("CARGO_PKG_VERSION"),
        "Starting background removal service"
    );

    let state = Arc::new(AppState::from_config(config, factory).context("Failed to initialize service")?);
    server::serve(state).await.context("Server error")?;

    Ok(())
}

fn create_factory(kind: BackendKind, config: &ServiceConfig) -> Result<Arc<dyn SessionFactory>> {
    match kind {
        #[cfg(feature = "tract")]
        BackendKind::Tract => {
            if !config.models_dir.is_dir() {
                warn!(
                    models_dir = %config.models_dir.display(),
                    "Models directory does not exist; model loads will fail until it is populated"
                );
            }
            Ok(Arc::new(crate::backends::TractSessionFactory::new(config.models_dir.clone())))
        },
        #[cfg(not(feature = "tract"))]
        BackendKind::Tract => {
            let _ = config;
            anyhow::bail!("Tract backend not compiled in; rebuild with --features tract")
        },
        BackendKind::Mock => {
            warn!("Using mock backend; output is a colour-key cutout, not a model prediction");
            Ok(Arc::new(crate::backends::MockSessionFactory::new()))
        },
    }
}
