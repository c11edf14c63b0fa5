//! Output format handling service
//!
//! Encodes composited results and derives the response headers that
//! describe them.

use crate::{config::OutputFormat, error::Result};
use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    ExtendedColorType, ImageEncoder, RgbaImage,
};

/// Prefix added to the stem of every output filename
pub const OUTPUT_FILENAME_PREFIX: &str = "nobg_";

/// Stem used when the client sent no usable filename
const DEFAULT_STEM: &str = "image";

/// Service for encoding results and naming them
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA image, keeping its alpha channel
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_api::{config::OutputFormat, services::OutputFormatHandler};
    /// use image::RgbaImage;
    ///
    /// let rgba_image = RgbaImage::new(4, 4);
    /// let bytes = OutputFormatHandler::encode(&rgba_image, OutputFormat::Png)?;
    /// assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - Encoder failures
    /// - WebP requested without the `webp-support` feature
    pub fn encode(rgba_image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        let (width, height) = rgba_image.dimensions();
        let mut buffer = Vec::new();

        match format {
            OutputFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buffer,
                    CompressionType::Best,
                    FilterType::Adaptive,
                );
                encoder.write_image(rgba_image.as_raw(), width, height, ExtendedColorType::Rgba8)?;
            },
            OutputFormat::WebP => Self::encode_webp(rgba_image, &mut buffer)?,
        }

        Ok(buffer)
    }

    #[cfg(feature = "webp-support")]
    fn encode_webp(rgba_image: &RgbaImage, buffer: &mut Vec<u8>) -> Result<()> {
        let (width, height) = rgba_image.dimensions();
        let encoder = image::codecs::webp::WebPEncoder::new_lossless(buffer);
        encoder.write_image(rgba_image.as_raw(), width, height, ExtendedColorType::Rgba8)?;
        Ok(())
    }

    #[cfg(not(feature = "webp-support"))]
    fn encode_webp(_rgba_image: &RgbaImage, _buffer: &mut Vec<u8>) -> Result<()> {
        Err(crate::error::BgRemovalError::invalid_config(
            "WebP output requires the webp-support feature",
        ))
    }

    /// MIME type of an output format
    #[must_use]
    pub fn content_type(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// File extension (without the dot) of an output format
    #[must_use]
    pub fn extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Derive the download filename from the client's filename
    ///
    /// Drops any directory part and the last extension, then adds the
    /// `nobg_` prefix and the output extension. Spaces and non-ASCII text are
    /// kept; quotes, semicolons, backslashes and control characters become `_`.
    ///
    /// ```rust
    /// use bgremove_api::{config::OutputFormat, services::OutputFormatHandler};
    ///
    /// let name = OutputFormatHandler::output_filename(Some("cat.photo.jpg"), OutputFormat::Png);
    /// assert_eq!(name, "nobg_cat.photo.png");
    /// ```
    #[must_use]
    pub fn output_filename(original: Option<&str>, format: OutputFormat) -> String {
        let base = original
            .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name))
            .unwrap_or_default();
        let stem = match base.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => base,
        };

        let sanitized: String = stem
            .chars()
            .map(|c| {
                if c.is_control() || matches!(c, '"' | ';' | '\\') {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        let stem = if sanitized.trim().is_empty() {
            DEFAULT_STEM
        } else {
            sanitized.as_str()
        };

        format!("{OUTPUT_FILENAME_PREFIX}{stem}.{}", Self::extension(format))
    }

    /// `Content-Disposition` header value for a download
    ///
    /// Plain names go out bare. Anything else is quoted with an ASCII
    /// fallback and also sent as an RFC 6266 `filename*` parameter.
    #[must_use]
    pub fn content_disposition(filename: &str) -> String {
        if filename.chars().all(is_token_char) {
            return format!("attachment; filename={filename}");
        }

        let fallback: String = filename
            .chars()
            .map(|c| {
                if (c.is_ascii_graphic() || c == ' ') && !matches!(c, '"' | '\\') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '~')
}
