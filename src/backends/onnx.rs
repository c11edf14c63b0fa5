//! ONNX Runtime backend implementation for background removal models
//!
//! Loads one ONNX Runtime session at startup and shares it between requests.
//! `ort` requires exclusive access to run a session, so calls are serialized
//! through a mutex inside the backend.

use crate::config::{ExecutionProvider, ServiceConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelKind, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// ONNX Runtime backend for running background removal models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Mutex<Session>,
    model_info: ModelInfo,
    preprocessing_config: PreprocessingConfig,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers with availability status
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool)> {
        vec![
            ("CPU".to_string(), true),
            (
                "CUDA".to_string(),
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false),
            ),
            (
                "CoreML".to_string(),
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false),
            ),
        ]
    }

    /// Load an ONNX model file and create the session
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Session builder or execution provider configuration failures
    /// - Invalid ONNX model
    pub fn load(model_path: &Path, kind: ModelKind, config: &ServiceConfig) -> Result<Self> {
        let model_load_start = Instant::now();

        let size_bytes = std::fs::metadata(model_path)
            .map_err(|e| BgRemovalError::file_io_error("read model metadata", model_path, &e))?
            .len() as usize;

        let session_builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to set optimization level: {e}"))
            })?;

        let session_builder =
            Self::configure_execution_providers(session_builder, config.execution_provider)?;

        let available = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            available
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (available / 4).max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| BgRemovalError::model(format!("Failed to enable parallel execution: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::model(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::model(format!("Failed to set inter threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                BgRemovalError::model(format!(
                    "Failed to create session from '{}': {e}",
                    model_path.display()
                ))
            })?;

        let model_info = ModelInfo::for_kind(kind, size_bytes);
        log::debug!("ONNX Runtime session created");
        log::debug!("  - Requested provider: {:?}", config.execution_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );
        log::debug!(
            "  - Model: {} ({:.2} MB)",
            model_info.name,
            size_bytes as f64 / (1024.0 * 1024.0)
        );
        log::info!(
            "Model loading complete: {:.0}ms",
            model_load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session: Mutex::new(session),
            model_info,
            preprocessing_config: kind.preprocessing_config(),
        })
    }

    fn configure_execution_providers(
        session_builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let mut providers: Vec<ExecutionProviderDispatch> = Vec::new();

        let cuda_provider = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false);
        let coreml_provider = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available =
            OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false);

        match provider {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda_provider.build());
                }
                if coreml_available {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml_provider.build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    providers.push(cuda_provider.build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("Using CoreML execution provider");
                    providers.push(coreml_provider.build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }

        if providers.is_empty() {
            return Ok(session_builder);
        }

        session_builder
            .with_execution_providers(providers)
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to set execution providers: {e}"))
            })
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BgRemovalError::internal("ONNX session lock poisoned"))?;

        // Positional inputs and outputs; tensor names differ between exports
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let output_shape = output_tensor.shape().to_vec();
        if output_shape.len() != 4 {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let output_data = output_tensor.view().to_owned();
        let result = Array4::from_shape_vec(
            (
                output_shape.first().copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(1),
                output_shape.get(2).copied().unwrap_or(1),
                output_shape.get(3).copied().unwrap_or(1),
            ),
            output_data.into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(result)
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing_config
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }
}
