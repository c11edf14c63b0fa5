//! Core types for background removal results

use serde::{Deserialize, Serialize};

/// Output of a processed upload, ready to be sent back to the client
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Encoded output image
    pub data: Vec<u8>,

    /// Image dimensions (width, height), identical to the input
    pub dimensions: (u32, u32),

    /// Per-stage timings
    pub timings: ProcessingTimings,
}

/// Binary segmentation mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Mask value at a pixel, zero when out of range
    #[must_use]
    pub fn value_at(&self, x: u32, y: u32) -> u8 {
        let (width, height) = self.dimensions;
        if x >= width || y >= height {
            return 0;
        }
        self.data
            .get(y as usize * width as usize + x as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Fraction of pixels considered foreground (value above half)
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&v| v > 127).count();
        foreground as f32 / self.data.len() as f32
    }
}

/// Timings for each processing stage, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub postprocessing_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}
