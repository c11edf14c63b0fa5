//! Image preprocessing for model inference

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Padding color used around the letterboxed image
const PADDING_COLOR: [u8; 3] = [255, 255, 255];

/// Geometry of an aspect-preserving resize centered on a square canvas
///
/// Shared by preprocessing and mask extraction so that both directions of
/// the mapping agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale factor from original to canvas coordinates
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    /// Side length of the square canvas
    pub target_size: u32,
}

impl Letterbox {
    /// Compute the letterbox for an image of `original` dimensions on a square canvas
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(original: (u32, u32), target_size: u32) -> Result<Self> {
        let (orig_width, orig_height) = original;
        if orig_width == 0 || orig_height == 0 || target_size == 0 {
            return Err(BgRemovalError::inference(format!(
                "Cannot letterbox {}x{} image onto {}px canvas",
                orig_width, orig_height, target_size
            )));
        }

        let target_size_f32 = target_size as f32;
        let scale = (target_size_f32 / orig_width as f32).min(target_size_f32 / orig_height as f32);

        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            target_size,
        })
    }
}

/// Image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image into a normalized NCHW tensor
    ///
    /// RGB conversion, aspect-preserving resize, center padding to the
    /// model's square input, then per-channel mean/std normalization.
    ///
    /// # Errors
    /// - Zero-sized input image
    /// - Target size too large for tensor allocation
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let target_size = preprocessing_config.target_size[0];
        let rgb_image = image.to_rgb8();
        let letterbox = Letterbox::compute(rgb_image.dimensions(), target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(target_size, target_size, image::Rgb(PADDING_COLOR));
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        let target_size_usize = usize::try_from(target_size).map_err(|_| {
            BgRemovalError::inference("Target size too large for tensor allocation")
        })?;

        Ok(Self::canvas_to_tensor(&canvas, preprocessing_config, target_size_usize))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(
        canvas: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
        target_size: usize,
    ) -> Array4<f32> {
        let mut tensor = Array4::<f32>::zeros((1, 3, target_size, target_size));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for channel in 0..3 {
                    tensor[[0, channel, y, x]] =
                        (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
                }
            }
        }

        tensor
    }
}
