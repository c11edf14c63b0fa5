//! Background removal service entry point
//!
//! Parses flags and environment, loads the model once, then serves HTTP
//! until SIGINT or SIGTERM.

use super::config::CliConfigBuilder;
use crate::{
    config::{ExecutionProvider, ServiceConfig, DEFAULT_PORT},
    download::ModelDownloader,
    lifecycle::{DefaultModelLoader, LifecycleController},
    models::ModelKind,
    server::{self, AppState},
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use instant::Instant;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Background removal HTTP service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-api")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "BGREMOVE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum upload size in MiB
    #[arg(long, env = "BGREMOVE_MAX_UPLOAD_MB", default_value_t = 10.0)]
    pub max_upload_mb: f64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Catalog model to use (u2netp, u2net, silueta, isnet-general-use)
    #[arg(short, long, env = "BGREMOVE_MODEL", default_value_t = ModelKind::U2netp)]
    pub model: ModelKind,

    /// Path to an ONNX model file; skips the cache and download
    #[arg(long, env = "BGREMOVE_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Directory for downloaded models
    #[arg(long, env = "BGREMOVE_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value_t = ExecutionProvider::Auto)]
    pub execution_provider: ExecutionProvider,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Use raw model output as alpha instead of stretching it to the full range
    #[arg(long)]
    pub no_mask_normalization: bool,

    /// Serve with a synthetic mask instead of a model (smoke tests)
    #[arg(long)]
    pub mock: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (console, compact, json)
    #[arg(long, default_value = "console")]
    pub log_format: TracingFormat,

    /// Filter directives such as `bgremove_api=debug,tower_http=trace`;
    /// overrides -v and RUST_LOG
    #[arg(long, env = "BGREMOVE_LOG")]
    pub log_filter: Option<String>,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// List catalog models and their cache status, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Download the configured model into the cache and exit
    #[arg(long)]
    pub only_download: bool,
}

/// Output formats selectable from the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CliOutputFormat {
    /// PNG with alpha channel
    Png,
    /// Lossless WebP with alpha channel
    Webp,
}

/// Main entry point
///
/// # Errors
/// - Invalid flags or environment
/// - Model loading failure
/// - Server bind or I/O failure
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut tracing = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format);
    if let Some(filter) = &cli.log_filter {
        tracing = tracing.with_env_filter(filter.clone());
    }
    tracing
        .init()
        .context("Failed to initialize tracing subscriber")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli)?;

    if cli.list_models {
        return list_models(&config);
    }

    if cli.only_download {
        return download_model_only(&config).await;
    }

    run(config).await
}

/// Load the model, then serve until shutdown
///
/// # Errors
/// - Model loading failure (the server never starts)
/// - Server bind or I/O failure
pub async fn run(config: ServiceConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.model_spec.display_name(),
        provider = %config.execution_provider,
        max_upload_bytes = config.max_upload_bytes,
        "Starting background removal service"
    );

    let lifecycle = Arc::new(LifecycleController::new());
    let loader = DefaultModelLoader::new(config.clone());

    let load_start = Instant::now();
    lifecycle
        .start(&loader)
        .await
        .context("Failed to load model")?;
    info!(
        "Model loaded in {:.0}ms",
        load_start.elapsed().as_secs_f64() * 1000.0
    );

    server::serve(AppState::new(config, lifecycle))
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn show_provider_diagnostics() {
    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    #[cfg(feature = "onnx")]
    {
        println!("\nONNX Runtime execution providers:");
        for (name, available) in crate::backends::OnnxBackend::list_providers() {
            let status = if available {
                "available"
            } else {
                "not available"
            };
            println!("  {name}: {status}");
        }
    }

    #[cfg(not(feature = "onnx"))]
    println!("\nONNX support not compiled in; only --mock is usable");
}

fn list_models(config: &ServiceConfig) -> Result<()> {
    let downloader = ModelDownloader::new(config.model_spec.cache_dir.clone())
        .context("Failed to initialize model cache")?;

    println!("Cache directory: {}", downloader.cache_dir().display());
    for kind in ModelKind::ALL {
        let path = downloader.cached_model_path(kind);
        let status = match std::fs::metadata(&path) {
            Ok(meta) => format!("cached, {:.1} MB", meta.len() as f64 / 1_048_576.0),
            Err(_) => "not cached".to_string(),
        };
        let default_marker = if kind == ModelKind::default() {
            " (default)"
        } else {
            ""
        };
        println!("  {kind}{default_marker}: {status}");
    }

    Ok(())
}

async fn download_model_only(config: &ServiceConfig) -> Result<()> {
    let downloader = ModelDownloader::new(config.model_spec.cache_dir.clone())
        .context("Failed to create model downloader")?;

    let path = downloader
        .ensure_model(&config.model_spec)
        .await
        .context("Failed to download model")?;

    println!("Model ready: {}", path.display());
    Ok(())
}
