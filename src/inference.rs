//! Inference backend abstraction

use crate::{
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
};
use ndarray::Array4;

/// A loaded segmentation model
///
/// Backends are constructed fully loaded and shared read-only between
/// requests, so `infer` takes `&self`. Implementations that wrap a runtime
/// requiring exclusive access serialize internally.
pub trait InferenceBackend: Send + Sync + std::fmt::Debug {
    /// Run inference on an NCHW input tensor and return the NCHW mask tensor
    ///
    /// # Errors
    /// - Model inference failures
    /// - Tensor conversion or processing errors
    /// - Invalid input tensor dimensions
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Preprocessing parameters the model expects
    fn preprocessing_config(&self) -> &PreprocessingConfig;

    /// Model information for logging and diagnostics
    fn model_info(&self) -> &ModelInfo;

    /// Get the expected input shape for this backend
    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info().input_shape
    }

    /// Get the expected output shape for this backend
    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info().output_shape
    }
}
