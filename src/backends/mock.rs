//! Mock backend implementation for testing and offline runs
//!
//! Produces a soft circular foreground mask centered in the model input,
//! so results are deterministic and need no model file.

use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelKind, PreprocessingConfig};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock backend for testing purposes
#[derive(Debug, Clone)]
pub struct MockBackend {
    model_info: ModelInfo,
    preprocessing_config: PreprocessingConfig,
    /// Number of `infer` calls, shared between clones
    calls: Arc<AtomicUsize>,
    should_fail_inference: bool,
}

impl MockBackend {
    /// Create a new mock backend shaped like the default model
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(ModelKind::default())
    }

    /// Create a mock backend shaped like the given catalog model
    #[must_use]
    pub fn with_kind(kind: ModelKind) -> Self {
        let mut model_info = ModelInfo::for_kind(kind, 0);
        model_info.name = format!("mock-{}", kind.name());
        Self {
            model_info,
            preprocessing_config: kind.preprocessing_config(),
            calls: Arc::new(AtomicUsize::new(0)),
            should_fail_inference: false,
        }
    }

    /// Create a mock backend that fails every inference call
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Number of inference calls made so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn generate_mock_output(input: &Array4<f32>) -> Array4<f32> {
        let (batch_size, _channels, height, width) = input.dim();
        let mut output = Array4::<f32>::zeros((batch_size, 1, height, width));

        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);

        for ((_, _, y, x), value) in output.indexed_iter_mut() {
            let dx = x as f32 + 0.5 - center_x;
            let dy = y as f32 + 0.5 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();

            // Solid core with a soft edge
            *value = if distance < radius {
                ((radius - distance) / (radius * 0.25)).clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        output
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock inference failure"));
        }

        let (_, channels, _, _) = input.dim();
        if channels != 3 {
            return Err(BgRemovalError::inference(format!(
                "Expected 3 input channels, got {}",
                channels
            )));
        }

        Ok(Self::generate_mock_output(input))
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing_config
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }
}
