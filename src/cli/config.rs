//! Conversion from command-line arguments to `ServiceConfig`

use super::main_impl::{Cli, CliOutputFormat};
use crate::config::{OutputFormat, ServiceConfig, MAX_UPLOAD_CEILING_BYTES};
use anyhow::{Context, Result};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Convert CLI arguments to a validated `ServiceConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServiceConfig> {
        let max_upload_bytes = Self::mib_to_bytes(cli.max_upload_mb)?;

        let mut builder = ServiceConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .max_upload_bytes(max_upload_bytes)
            .output_format(Self::output_format(cli.format))
            .execution_provider(cli.execution_provider)
            .num_threads(cli.threads)
            .normalize_mask(!cli.no_mask_normalization)
            .mock_backend(cli.mock)
            .model(cli.model);

        if let Some(path) = &cli.model_path {
            builder = builder.model_path(path.clone());
        }
        if let Some(dir) = &cli.model_dir {
            builder = builder.model_cache_dir(dir.clone());
        }

        builder.build().context("Invalid service configuration")
    }

    fn output_format(format: CliOutputFormat) -> OutputFormat {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Webp => OutputFormat::WebP,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn mib_to_bytes(mib: f64) -> Result<u64> {
        let ceiling_mib = MAX_UPLOAD_CEILING_BYTES as f64 / BYTES_PER_MIB;
        if !mib.is_finite() || mib <= 0.0 || mib > ceiling_mib {
            anyhow::bail!("--max-upload-mb must be greater than 0 and at most {ceiling_mib}, got {mib}");
        }
        Ok((mib * BYTES_PER_MIB).round() as u64)
    }
}
