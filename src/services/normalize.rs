//! Decoding and color-mode normalization
//!
//! The model consumes 3-channel input and the compositor writes an alpha
//! channel, so every decoded image is brought to 8-bit RGB or RGBA first.

use crate::error::Result;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat, ImageReader};
use serde::Serialize;
use std::io::Cursor;

/// Color mode of the source image, as declared by its codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorMode {
    Rgb,
    Rgba,
    Paletted,
    GrayscaleAlpha,
    Grayscale,
    /// 1-bit black and white
    Binary,
    Cmyk,
    Other,
}

impl ColorMode {
    /// Map a codec color type to a source mode
    ///
    /// Decoders that expand palettes or convert CMYK report the expanded
    /// type here, so [`PixelBuffer::decode`] prefers the mode declared in
    /// the container header when there is one.
    #[must_use]
    pub fn from_color_type(color_type: ExtendedColorType) -> Self {
        match color_type {
            ExtendedColorType::Rgb1
            | ExtendedColorType::Rgb2
            | ExtendedColorType::Rgb4
            | ExtendedColorType::Rgb8
            | ExtendedColorType::Rgb16
            | ExtendedColorType::Rgb32F
            | ExtendedColorType::Bgr8 => Self::Rgb,
            ExtendedColorType::Rgba1
            | ExtendedColorType::Rgba2
            | ExtendedColorType::Rgba4
            | ExtendedColorType::Rgba8
            | ExtendedColorType::Rgba16
            | ExtendedColorType::Rgba32F
            | ExtendedColorType::Bgra8 => Self::Rgba,
            ExtendedColorType::L1 => Self::Binary,
            ExtendedColorType::L2
            | ExtendedColorType::L4
            | ExtendedColorType::L8
            | ExtendedColorType::L16 => Self::Grayscale,
            ExtendedColorType::La1
            | ExtendedColorType::La2
            | ExtendedColorType::La4
            | ExtendedColorType::La8
            | ExtendedColorType::La16 => Self::GrayscaleAlpha,
            ExtendedColorType::Cmyk8 => Self::Cmyk,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Rgba => "RGBA",
            Self::Paletted => "P",
            Self::GrayscaleAlpha => "LA",
            Self::Grayscale => "L",
            Self::Binary => "1",
            Self::Cmyk => "CMYK",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded image together with its source color mode
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub image: DynamicImage,
    pub mode: ColorMode,
    /// Whether the decoded pixels carry an alpha channel
    pub has_transparency: bool,
}

impl PixelBuffer {
    /// Wrap an already decoded image
    #[must_use]
    pub fn new(image: DynamicImage, mode: ColorMode) -> Self {
        let has_transparency = image.color().has_alpha();
        Self {
            image,
            mode,
            has_transparency,
        }
    }

    /// Decode raw upload bytes, guessing the format from content
    ///
    /// # Errors
    /// - Unrecognized or unsupported image format
    /// - Corrupt image data
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let declared = reader
            .format()
            .and_then(|format| declared_mode(format, bytes));
        let decoder = reader.into_decoder()?;
        let mode = declared
            .unwrap_or_else(|| ColorMode::from_color_type(decoder.original_color_type()));
        let image = DynamicImage::from_decoder(decoder)?;

        log::debug!(
            "Decoded {}x{} image, source mode {}",
            image.width(),
            image.height(),
            mode
        );

        Ok(Self::new(image, mode))
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Source mode read from the container header
///
/// Only covers the cases the decoders hide: indexed and 1-bit PNG, GIF and
/// four-component JPEG. `None` defers to the decoder.
fn declared_mode(format: ImageFormat, bytes: &[u8]) -> Option<ColorMode> {
    match format {
        ImageFormat::Png => png_declared_mode(bytes),
        ImageFormat::Gif => Some(ColorMode::Paletted),
        ImageFormat::Jpeg => (jpeg_component_count(bytes)? == 4).then_some(ColorMode::Cmyk),
        _ => None,
    }
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

fn png_declared_mode(bytes: &[u8]) -> Option<ColorMode> {
    // IHDR is always first: length, tag, width, height, bit depth, color type
    let ihdr = bytes.strip_prefix(PNG_SIGNATURE)?;
    if ihdr.get(4..8)? != b"IHDR" {
        return None;
    }
    match (*ihdr.get(17)?, *ihdr.get(16)?) {
        (3, _) => Some(ColorMode::Paletted),
        (0, 1) => Some(ColorMode::Binary),
        _ => None,
    }
}

/// Component count from the first start-of-frame segment
fn jpeg_component_count(bytes: &[u8]) -> Option<u8> {
    if bytes.get(..2)? != [0xFF, 0xD8] {
        return None;
    }
    let mut pos = 2;
    loop {
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        pos += 1;
        while *bytes.get(pos)? == 0xFF {
            pos += 1;
        }
        let marker = *bytes.get(pos)?;
        pos += 1;
        match marker {
            0x01 | 0xD0..=0xD8 => continue,
            0xD9 | 0xDA => return None,
            _ => {},
        }
        let length = usize::from(u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]));
        // SOF0..SOF15 minus DHT, JPG and DAC
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            // length, precision, height, width, then the component count
            return bytes.get(pos + 7).copied();
        }
        pos += length.max(2);
    }
}

/// Converts decoded images to the modes the processor accepts
pub struct ModeNormalizer;

impl ModeNormalizer {
    /// Target mode for a source mode
    ///
    /// Always `Rgb` or `Rgba`. Paletted images keep alpha only when they
    /// carry transparency.
    #[must_use]
    pub fn target_mode(mode: ColorMode, has_transparency: bool) -> ColorMode {
        match mode {
            ColorMode::Rgb => ColorMode::Rgb,
            ColorMode::Rgba | ColorMode::GrayscaleAlpha => ColorMode::Rgba,
            ColorMode::Paletted if has_transparency => ColorMode::Rgba,
            ColorMode::Paletted | ColorMode::Grayscale | ColorMode::Binary | ColorMode::Cmyk => {
                ColorMode::Rgb
            },
            ColorMode::Other => {
                log::debug!("Unrecognized source mode, converting to RGB");
                ColorMode::Rgb
            },
        }
    }

    /// Convert a buffer to its target mode with 8-bit samples
    #[must_use]
    pub fn normalize(buffer: PixelBuffer) -> PixelBuffer {
        let target = Self::target_mode(buffer.mode, buffer.has_transparency);

        if target != buffer.mode {
            log::info!("Converting image mode {} -> {}", buffer.mode, target);
        }

        let image = match (target, buffer.image) {
            (ColorMode::Rgba, image @ DynamicImage::ImageRgba8(_))
            | (ColorMode::Rgb, image @ DynamicImage::ImageRgb8(_)) => image,
            (ColorMode::Rgba, image) => DynamicImage::ImageRgba8(image.to_rgba8()),
            (_, image) => DynamicImage::ImageRgb8(image.to_rgb8()),
        };

        PixelBuffer::new(image, target)
    }
}
