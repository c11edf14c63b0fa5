//! Backend implementations for inference
//!
//! - ONNX Runtime backend (feature `onnx`)
//! - Mock backend (deterministic mask, used by tests and `--mock` runs)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use self::mock::MockBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;
