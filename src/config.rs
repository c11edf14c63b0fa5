//! Configuration types for the background removal service

use crate::error::{BgRemovalError, Result};
use crate::models::{ModelKind, ModelSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default maximum upload size (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Hard ceiling for the configurable upload size
pub const MAX_UPLOAD_CEILING_BYTES: u64 = 512 * 1024 * 1024;

/// Default listening port when `PORT` is not set
pub const DEFAULT_PORT: u16 = 8000;

/// Declared MIME types accepted for upload
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/webp",
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "image/avif",
    "image/heic",
    "image/heif",
    "image/x-tga",
    "image/x-pcx",
    "image/x-portable-pixmap",
    "image/x-portable-graymap",
    "image/x-portable-bitmap",
    "image/x-portable-anymap",
    "image/x-ms-bmp",
];

/// Filename extensions accepted when the declared MIME type is missing or unknown
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "ico", "avif", "heic", "heif",
    "tga", "pcx", "ppm", "pgm", "pbm", "pnm",
];

/// Format names advertised by the service metadata endpoint
pub const SUPPORTED_FORMAT_NAMES: &[&str] = &[
    "JPEG", "PNG", "GIF", "BMP", "TIFF", "WebP", "ICO", "AVIF", "HEIC", "TGA", "PCX", "PPM",
    "PGM", "PBM",
];

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Output image format options (alpha-capable formats only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// Lossless WebP with alpha channel transparency
    WebP,
}

/// Configuration for the background removal service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Interface to bind
    pub host: String,

    /// TCP port to listen on
    pub port: u16,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,

    /// Output format for processed images
    pub output_format: OutputFormat,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Stretch the predicted mask to the full 0..1 range before compositing
    pub normalize_mask: bool,

    /// Serve with the deterministic mock backend instead of a real model
    pub mock_backend: bool,

    /// Model specification including kind, path and cache location
    pub model_spec: ModelSpec,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            output_format: OutputFormat::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0, // Auto-detect optimal intra-op threads
            inter_threads: 0, // Auto-detect optimal inter-op threads
            normalize_mask: true,
            mock_backend: false,
            model_spec: ModelSpec::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bgremove_api::{ServiceConfig, ExecutionProvider};
    ///
    /// let config = ServiceConfig::builder()
    ///     .port(9000)
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.bind_address(), "0.0.0.0:9000");
    /// ```
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Port 0
    /// - Upload limit of zero or above the ceiling
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(BgRemovalError::config_value_error(
                "port",
                self.port,
                "1-65535",
                Some(DEFAULT_PORT),
            ));
        }

        if self.max_upload_bytes == 0 || self.max_upload_bytes > MAX_UPLOAD_CEILING_BYTES {
            return Err(BgRemovalError::config_value_error(
                "maximum upload size",
                self.max_upload_bytes,
                "1-536870912 bytes",
                Some(DEFAULT_MAX_UPLOAD_BYTES),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(BgRemovalError::invalid_config("host must not be empty"));
        }

        Ok(())
    }

    /// `host:port` string for binding the listener
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Limit applied to the whole request body; leaves room for multipart framing
    #[must_use]
    pub fn request_body_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes + 1024 * 1024).unwrap_or(usize::MAX)
    }
}

/// Builder for `ServiceConfig`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Set bind host
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set listening port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set maximum upload size in bytes
    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Set output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set both intra and inter threads (0 = auto-detect)
    ///
    /// Intra-op threads get `threads`, inter-op threads get half of it (minimum 1).
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Enable or disable min-max mask normalization
    #[must_use]
    pub fn normalize_mask(mut self, normalize: bool) -> Self {
        self.config.normalize_mask = normalize;
        self
    }

    /// Serve with the mock backend
    #[must_use]
    pub fn mock_backend(mut self, mock: bool) -> Self {
        self.config.mock_backend = mock;
        self
    }

    /// Set which model to load
    #[must_use]
    pub fn model(mut self, kind: ModelKind) -> Self {
        self.config.model_spec.kind = kind;
        self
    }

    /// Load the model from an explicit file
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_spec.path = Some(path.into());
        self
    }

    /// Override the model cache directory
    #[must_use]
    pub fn model_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_spec.cache_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`ServiceConfig::validate`]
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
