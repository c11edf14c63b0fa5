//! Model downloading and caching
//!
//! Resolves a `ModelSpec` to a model file on disk. Explicit paths are used
//! as-is; catalog models are looked up in the cache directory and fetched on
//! first use. Downloads stream into a temporary file next to the target and
//! are renamed into place only once complete, so an interrupted download
//! never leaves a truncated model behind.

use crate::error::{BgRemovalError, Result};
use crate::models::{ModelKind, ModelSpec};
use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Model downloader backed by an on-disk cache
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache_dir: PathBuf,
}

impl ModelDownloader {
    /// Create a downloader using `cache_dir`, or the platform cache directory
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - No cache directory could be determined
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // 5 minute timeout
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => Self::default_cache_dir()?,
        };

        Ok(Self { client, cache_dir })
    }

    /// Platform cache directory for downloaded models
    ///
    /// # Errors
    /// - The platform has no cache directory
    pub fn default_cache_dir() -> Result<PathBuf> {
        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(
                    "Failed to determine cache directory. Set BGREMOVE_MODEL_DIR environment variable.",
                )
            })?
            .join("bgremove-api")
            .join("models"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where a catalog model lives inside the cache
    #[must_use]
    pub fn cached_model_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir.join(kind.file_name())
    }

    /// Resolve a model spec to a local file, downloading when needed
    ///
    /// # Errors
    /// - Explicit model path does not exist
    /// - Network or file system errors while downloading
    pub async fn ensure_model(&self, spec: &ModelSpec) -> Result<PathBuf> {
        if let Some(path) = &spec.path {
            if !path.is_file() {
                return Err(BgRemovalError::file_io_error(
                    "open model",
                    path,
                    &std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            log::info!("Using model file {}", path.display());
            return Ok(path.clone());
        }

        let cached = self.cached_model_path(spec.kind);
        let cached_size = fs::metadata(&cached).map(|m| m.len()).unwrap_or(0);
        if cached_size > 0 {
            log::info!(
                "Using cached model {} ({:.1} MB)",
                cached.display(),
                cached_size as f64 / (1024.0 * 1024.0)
            );
            return Ok(cached);
        }

        log::info!(
            "Model {} not cached, downloading to {}",
            spec.kind,
            cached.display()
        );
        self.download_file(&spec.kind.download_url(), &cached).await?;
        Ok(cached)
    }

    /// Download a single file, returning its size in bytes
    ///
    /// # Errors
    /// - Request failure or non-success HTTP status
    /// - File system errors while writing or renaming
    pub async fn download_file(&self, url: &str, local_path: &Path) -> Result<u64> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let parent = local_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("HTTP error for {url}"),
                response.status(),
            ));
        }

        // Removed automatically if we bail out before persisting
        let (std_file, temp_path) = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(parent)
            .map_err(|e| BgRemovalError::file_io_error("create temporary file", parent, &e))?
            .into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", &temp_path, &e))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", &temp_path, &e))?;
        drop(file);

        if downloaded == 0 {
            return Err(BgRemovalError::network_error(
                format!("Download from {url} was empty"),
                "no content",
            ));
        }

        temp_path.persist(local_path).map_err(|e| {
            BgRemovalError::file_io_error("move download into place", local_path, &e.error)
        })?;

        log::info!(
            "Downloaded {} bytes to {} (sha256 {:x})",
            downloaded,
            local_path.display(),
            hasher.finalize()
        );
        Ok(downloaded)
    }
}
