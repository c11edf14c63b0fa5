//! Background removal processor
//!
//! Runs the full request pipeline on one upload: decode, mode normalization,
//! preprocessing, inference, mask extraction, compositing and encoding. The
//! processor is cheap to clone and holds only a shared handle to the backend.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    services::{ModeNormalizer, OutputFormatHandler, PixelBuffer},
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{ImagePreprocessor, Letterbox},
};
use image::{ImageBuffer, RgbaImage};
use instant::Instant;
use log::debug;
use ndarray::Array4;
use std::sync::Arc;
use tracing::{info as trace_info, instrument};

/// Coordinate transformation parameters for tensor-to-mask conversion
#[derive(Debug, Clone)]
struct CoordinateTransformation {
    letterbox: Letterbox,
    /// Mask width in tensor coordinates
    mask_width: usize,
    /// Mask height in tensor coordinates
    mask_height: usize,
}

/// Background removal pipeline bound to one inference backend
#[derive(Debug, Clone)]
pub struct BackgroundRemovalProcessor {
    backend: Arc<dyn InferenceBackend>,
    normalize_mask: bool,
}

impl BackgroundRemovalProcessor {
    /// Create a processor over a shared backend
    ///
    /// With `normalize_mask` set, raw model output is min-max stretched to
    /// the full 0..1 range before quantization.
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>, normalize_mask: bool) -> Self {
        Self {
            backend,
            normalize_mask,
        }
    }

    /// Process raw upload bytes into an encoded image
    ///
    /// Every failure is reported as `InferenceFailure`, except internal
    /// errors such as a poisoned session lock.
    ///
    /// # Errors
    /// - Undecodable input
    /// - Inference or encoding failures
    #[instrument(skip(self, bytes), fields(upload_bytes = bytes.len(), model = %self.backend.model_info().name))]
    pub fn process_upload(&self, bytes: &[u8], format: OutputFormat) -> Result<RemovalResult> {
        self.process_upload_inner(bytes, format)
            .map_err(Self::into_processing_error)
    }

    fn process_upload_inner(&self, bytes: &[u8], format: OutputFormat) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let decode_start = Instant::now();
        let buffer = ModeNormalizer::normalize(PixelBuffer::decode(bytes)?);
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;

        let dimensions = buffer.dimensions();
        let result_image = self.remove_background_timed(&buffer, &mut timings)?;

        let encode_start = Instant::now();
        let data = OutputFormatHandler::encode(&result_image, format)?;
        timings.encode_ms = encode_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        trace_info!(
            width = dimensions.0,
            height = dimensions.1,
            decode_ms = timings.decode_ms,
            preprocessing_ms = timings.preprocessing_ms,
            inference_ms = timings.inference_ms,
            postprocessing_ms = timings.postprocessing_ms,
            encode_ms = timings.encode_ms,
            total_ms = timings.total_ms,
            "Background removal complete"
        );

        Ok(RemovalResult {
            data,
            dimensions,
            timings,
        })
    }

    /// Remove the background from a decoded image
    ///
    /// The result has the input's dimensions; alpha carries the mask.
    ///
    /// # Errors
    /// - Preprocessing, inference or mask extraction failures
    pub fn remove_background(&self, buffer: &PixelBuffer) -> Result<RgbaImage> {
        let mut timings = ProcessingTimings::default();
        self.remove_background_timed(buffer, &mut timings)
            .map_err(Self::into_processing_error)
    }

    fn remove_background_timed(
        &self,
        buffer: &PixelBuffer,
        timings: &mut ProcessingTimings,
    ) -> Result<RgbaImage> {
        let preprocess_start = Instant::now();
        let input_tensor = ImagePreprocessor::preprocess_for_inference(
            &buffer.image,
            self.backend.preprocessing_config(),
        )?;
        timings.preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let output_tensor = self.backend.infer(&input_tensor)?;
        timings.inference_ms = inference_start.elapsed().as_millis() as u64;

        let postprocess_start = Instant::now();
        let mask = self.tensor_to_mask(&output_tensor, buffer.dimensions())?;
        let result = Self::apply_background_removal(buffer, &mask);
        timings.postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;

        debug!(
            "Mask foreground ratio: {:.1}%",
            mask.foreground_ratio() * 100.0
        );

        Ok(result)
    }

    fn into_processing_error(error: BgRemovalError) -> BgRemovalError {
        match error {
            e @ (BgRemovalError::InferenceFailure(_) | BgRemovalError::Internal(_)) => e,
            other => BgRemovalError::InferenceFailure(other.to_string()),
        }
    }

    /// Convert output tensor to segmentation mask with proper aspect ratio handling
    fn tensor_to_mask(
        &self,
        tensor: &Array4<f32>,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let transformation = Self::calculate_inverse_transformation(tensor, original_dimensions)?;
        let mut values =
            Self::extract_mask_values_from_tensor(tensor, original_dimensions, &transformation);

        if self.normalize_mask {
            Self::stretch_to_unit_range(&mut values);
        }

        let mask_data = values
            .iter()
            .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        Ok(SegmentationMask::new(mask_data, original_dimensions))
    }

    /// Validate the tensor and reproduce the preprocessing letterbox
    fn calculate_inverse_transformation(
        tensor: &Array4<f32>,
        original_dimensions: (u32, u32),
    ) -> Result<CoordinateTransformation> {
        let (batch, channels, mask_height, mask_width) = tensor.dim();
        if batch != 1 || channels < 1 || mask_height == 0 || mask_width == 0 {
            return Err(BgRemovalError::inference(format!(
                "Invalid output tensor shape: {:?}",
                tensor.shape()
            )));
        }

        // Models emit square masks matching their square input
        let target_size = u32::try_from(mask_width.max(mask_height))
            .map_err(|_| BgRemovalError::inference("Output tensor too large"))?;
        let letterbox = Letterbox::compute(original_dimensions, target_size)?;

        Ok(CoordinateTransformation {
            letterbox,
            mask_width,
            mask_height,
        })
    }

    /// Sample the first output channel at each original pixel
    fn extract_mask_values_from_tensor(
        tensor: &Array4<f32>,
        original_dimensions: (u32, u32),
        transformation: &CoordinateTransformation,
    ) -> Vec<f32> {
        let (orig_width, orig_height) = original_dimensions;
        let letterbox = &transformation.letterbox;
        let mut values = Vec::with_capacity(orig_width as usize * orig_height as usize);

        let max_x = letterbox.scaled_width.saturating_sub(1) as f32;
        let max_y = letterbox.scaled_height.saturating_sub(1) as f32;

        for y in 0..orig_height {
            let scaled_y = ((y as f32 + 0.5) * letterbox.scale - 0.5).clamp(0.0, max_y);
            let tensor_y = scaled_y.round() as usize + letterbox.offset_y as usize;

            for x in 0..orig_width {
                let scaled_x = ((x as f32 + 0.5) * letterbox.scale - 0.5).clamp(0.0, max_x);
                let tensor_x = scaled_x.round() as usize + letterbox.offset_x as usize;

                let value = if tensor_x < transformation.mask_width
                    && tensor_y < transformation.mask_height
                {
                    tensor.get([0, 0, tensor_y, tensor_x]).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                values.push(value);
            }
        }

        values
    }

    /// Min-max stretch; a flat mask is left untouched
    fn stretch_to_unit_range(values: &mut [f32]) {
        let (min, max) = values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        let range = max - min;
        if !range.is_finite() || range <= f32::EPSILON {
            return;
        }

        for value in values.iter_mut() {
            *value = (*value - min) / range;
        }
    }

    /// Apply background removal using the segmentation mask
    ///
    /// Alpha is the mask scaled by any source alpha. Fully transparent
    /// pixels are written as `[0, 0, 0, 0]`.
    fn apply_background_removal(buffer: &PixelBuffer, mask: &SegmentationMask) -> RgbaImage {
        let rgba_image = buffer.image.to_rgba8();
        let (width, height) = rgba_image.dimensions();
        let mut result = ImageBuffer::new(width, height);

        for (x, y, pixel) in rgba_image.enumerate_pixels() {
            let mask_value = u16::from(mask.value_at(x, y));
            let alpha = (mask_value * u16::from(pixel[3]) / 255) as u8;

            if alpha > 0 {
                result.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], alpha]));
            } else {
                result.put_pixel(x, y, image::Rgba([0, 0, 0, 0]));
            }
        }

        result
    }
}
