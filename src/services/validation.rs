//! Upload validation
//!
//! Checks an upload's size and declared type before any decoding happens.

use crate::{
    config::{ServiceConfig, ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES},
    error::{BgRemovalError, Result},
};

/// Metadata the client declared alongside the uploaded bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMeta {
    /// Declared MIME type of the multipart field
    pub content_type: Option<String>,
    /// Client-side filename of the multipart field
    pub filename: Option<String>,
}

impl UploadMeta {
    #[must_use]
    pub fn new(content_type: Option<String>, filename: Option<String>) -> Self {
        Self {
            content_type,
            filename,
        }
    }

    /// Filename extension (last dot-separated segment), lowercased
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let filename = self.filename.as_deref()?;
        let (_, extension) = filename.rsplit_once('.')?;
        if extension.is_empty() {
            return None;
        }
        Some(extension.to_ascii_lowercase())
    }
}

/// Validates uploads against the size limit and the type allow-lists
#[derive(Debug, Clone, Copy)]
pub struct UploadValidator {
    max_upload_bytes: u64,
}

impl UploadValidator {
    #[must_use]
    pub fn new(max_upload_bytes: u64) -> Self {
        Self { max_upload_bytes }
    }

    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.max_upload_bytes)
    }

    #[must_use]
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Validate an upload
    ///
    /// Checks run in a fixed order: empty, then too large, then type. An
    /// upload passes the type check when either its content type or its
    /// filename extension is allowed.
    ///
    /// # Errors
    /// - `EmptyPayload` for zero bytes
    /// - `PayloadTooLarge` above the configured limit
    /// - `InvalidFormat` when neither content type nor extension is allowed
    pub fn validate(&self, meta: &UploadMeta, byte_len: u64) -> Result<()> {
        if byte_len == 0 {
            return Err(BgRemovalError::EmptyPayload);
        }

        if byte_len > self.max_upload_bytes {
            return Err(BgRemovalError::payload_too_large(self.max_upload_bytes));
        }

        let type_allowed = meta
            .content_type
            .as_deref()
            .is_some_and(Self::is_allowed_content_type);
        let extension_allowed = meta
            .extension()
            .is_some_and(|ext| Self::is_allowed_extension(&ext));

        if !type_allowed && !extension_allowed {
            log::debug!(
                "Rejected upload: content type {:?}, filename {:?}",
                meta.content_type,
                meta.filename
            );
            return Err(BgRemovalError::InvalidFormat);
        }

        Ok(())
    }

    /// Check a MIME type against the allow-list, ignoring case and parameters
    #[must_use]
    pub fn is_allowed_content_type(content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        ALLOWED_MIME_TYPES.contains(&essence.as_str())
    }

    /// Check an extension (without the dot) against the allow-list
    #[must_use]
    pub fn is_allowed_extension(extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        ALLOWED_EXTENSIONS.contains(&extension.as_str())
    }
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_UPLOAD_BYTES)
    }
}
