//! Error types for background removal requests

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Detail returned to clients for errors whose message must not leak
pub const INTERNAL_ERROR_DETAIL: &str = "Internal server error";

/// Error taxonomy for the background removal service
///
/// The first group are client errors raised by upload validation. The rest
/// are server-side failures; only `InferenceFailure` exposes its message.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Neither the declared content type nor the filename extension is recognized
    #[error("Invalid file type. Supported formats: JPEG, PNG, GIF, BMP, TIFF, WebP, ICO, AVIF, and more")]
    InvalidFormat,

    /// Upload exceeds the configured maximum size
    #[error("File too large. Maximum size: {}", format_size(.limit))]
    PayloadTooLarge { limit: u64 },

    /// Upload carried zero bytes
    #[error("Empty file uploaded")]
    EmptyPayload,

    /// Malformed multipart request or missing file field
    #[error("{0}")]
    BadRequest(String),

    /// Model session is not ready (before startup or after shutdown)
    #[error("Model is not loaded; service unavailable")]
    ServiceUnavailable,

    /// Decoding, preprocessing, model inference or encoding failed
    #[error("Failed to process image: {0}")]
    InferenceFailure(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors outside the request path
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Render a byte limit with one decimal: `10.0MB`, `48.0KB`, or plain bytes
fn format_size(bytes: &u64) -> String {
    match *bytes {
        b if b >= MIB => format!("{:.1}MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1}KB", b as f64 / KIB as f64),
        b => format!("{b} bytes"),
    }
}

impl BgRemovalError {
    /// Create a new payload-too-large error for the given byte limit
    pub fn payload_too_large(limit: u64) -> Self {
        Self::PayloadTooLarge { limit }
    }

    /// Create a new bad request error
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceFailure(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error with the failing operation as context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
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
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error was caused by the client's upload
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat
                | Self::PayloadTooLarge { .. }
                | Self::EmptyPayload
                | Self::BadRequest(_)
        )
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else if matches!(self, Self::ServiceUnavailable) {
            503
        } else {
            500
        }
    }

    /// Client-facing detail message
    ///
    /// Validation, availability and inference errors carry their own message;
    /// everything else collapses to a generic detail.
    #[must_use]
    pub fn detail(&self) -> String {
        if self.is_client_error()
            || matches!(self, Self::ServiceUnavailable | Self::InferenceFailure(_))
        {
            self.to_string()
        } else {
            INTERNAL_ERROR_DETAIL.to_string()
        }
    }
}
