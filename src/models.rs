//! Model catalog and specification

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Salient-object segmentation models the service knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Lightweight U²-Net (4.7 MB), the default
    #[default]
    U2netp,
    /// Full U²-Net (176 MB)
    U2net,
    /// Pruned U²-Net (43 MB)
    Silueta,
    /// IS-Net general use (1024px input)
    IsnetGeneralUse,
}

impl ModelKind {
    /// All catalog entries
    pub const ALL: [ModelKind; 4] = [
        ModelKind::U2netp,
        ModelKind::U2net,
        ModelKind::Silueta,
        ModelKind::IsnetGeneralUse,
    ];

    /// Short model name as used on the command line
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2netp => "u2netp",
            Self::U2net => "u2net",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
        }
    }

    /// File name of the ONNX model inside the cache directory
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.name())
    }

    /// Download URL for the ONNX model
    #[must_use]
    pub fn download_url(self) -> String {
        format!("{}/{}", RELEASE_BASE_URL, self.file_name())
    }

    /// Preprocessing parameters the model was trained with
    #[must_use]
    pub fn preprocessing_config(self) -> PreprocessingConfig {
        match self {
            Self::U2netp | Self::U2net | Self::Silueta => PreprocessingConfig {
                target_size: [320, 320],
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            Self::IsnetGeneralUse => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                BgRemovalError::invalid_config(format!(
                    "Unknown model '{}'. Available models: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Which model to load and where to find it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelSpec {
    pub kind: ModelKind,
    /// Explicit model file; bypasses the cache and download
    pub path: Option<PathBuf>,
    /// Cache directory override; defaults to the user cache directory
    pub cache_dir: Option<PathBuf>,
}

impl ModelSpec {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.path {
            Some(path) => format!(
                "external:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
            None => format!("cached:{}", self.kind),
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

impl ModelInfo {
    /// Build model info for a catalog entry with its default square geometry
    #[must_use]
    pub fn for_kind(kind: ModelKind, size_bytes: usize) -> Self {
        let side = kind.preprocessing_config().target_size[0] as usize;
        Self {
            name: kind.name().to_string(),
            size_bytes,
            input_shape: (1, 3, side, side),
            output_shape: (1, 1, side, side),
        }
    }
}

/// Tensor preprocessing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}
