#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Background Removal API
//!
//! An HTTP service that removes image backgrounds with a pretrained
//! salient-object segmentation model (U²-Net family) running on ONNX Runtime.
//!
//! One model session is loaded at startup and shared by every request.
//! Uploads are validated, decoded, normalized to RGB/RGBA, segmented, and
//! returned as a transparent PNG.
//!
//! ## Features
//!
//! - **Broad input support**: JPEG, PNG, GIF, BMP, TIFF, WebP, ICO, TGA, PNM
//! - **Model catalog**: `u2netp` (default), `u2net`, `silueta`, `isnet-general-use`,
//!   downloaded and cached on first use
//! - **Hardware acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Graceful lifecycle**: SIGINT/SIGTERM release the model and drain requests
//!
//! ## Embedding the router
//!
//! ```rust,no_run
//! use bgremove_api::{
//!     backends::MockBackend, lifecycle::{LifecycleController, ModelLoader},
//!     server::{self, AppState}, InferenceBackend, ServiceConfig,
//! };
//! use std::sync::Arc;
//!
//! struct Mock;
//!
//! #[async_trait::async_trait]
//! impl ModelLoader for Mock {
//!     async fn load(&self) -> bgremove_api::Result<Arc<dyn InferenceBackend>> {
//!         Ok(Arc::new(MockBackend::new()))
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::builder().port(8080).build()?;
//! let lifecycle = Arc::new(LifecycleController::new());
//! lifecycle.start(&Mock).await?;
//! server::serve(AppState::new(config, lifecycle)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend
//! - `webp-support` (default): WebP input decoding and WebP output
//! - `tracing-json`: JSON log output

pub mod backends;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod lifecycle;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use config::{ExecutionProvider, OutputFormat, ServiceConfig, ServiceConfigBuilder};
pub use download::ModelDownloader;
pub use error::{BgRemovalError, Result};
pub use inference::InferenceBackend;
pub use lifecycle::{DefaultModelLoader, LifecycleController, ModelLoader, SessionState};
pub use models::{ModelInfo, ModelKind, ModelSpec};
pub use processor::BackgroundRemovalProcessor;
pub use services::{ColorMode, ModeNormalizer, OutputFormatHandler, PixelBuffer, UploadMeta, UploadValidator};
pub use types::{ProcessingTimings, RemovalResult, SegmentationMask};
