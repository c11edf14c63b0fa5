//! Request-path services
//!
//! Upload validation, decoding and mode normalization, and output encoding.
//! Each is stateless and independent of the HTTP layer.

pub mod format;
pub mod normalize;
pub mod validation;

pub use format::OutputFormatHandler;
pub use normalize::{ColorMode, ModeNormalizer, PixelBuffer};
pub use validation::{UploadMeta, UploadValidator};
