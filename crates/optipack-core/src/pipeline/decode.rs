//! Image decoding with format detection and allocation limits.

use image::{DynamicImage, GenericImageView, ImageFormat, Limits};
use std::io::Cursor;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::TransformError;

/// Image decoder with configurable limits.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode an in-memory image.
    ///
    /// The format is detected from the content first; the extension of `name`
    /// is only consulted when the content is not recognized. Dimension and
    /// allocation limits are enforced by the decoder itself, so oversized
    /// images fail before their pixels are allocated.
    pub fn decode(&self, bytes: &[u8], name: &str) -> Result<DecodedImage, TransformError> {
        let mut reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| TransformError::Decode {
                message: format!("Cannot detect image format: {}", e),
            })?;

        let format = match reader.format() {
            Some(f) => f,
            None => {
                let f = ImageFormat::from_path(Path::new(name)).map_err(|_| {
                    TransformError::Decode {
                        message: "Unrecognized image format".to_string(),
                    }
                })?;
                reader.set_format(f);
                f
            }
        };

        reader.limits(self.decode_limits());
        let image = reader.decode().map_err(|e| TransformError::Decode {
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        Ok(DecodedImage {
            image,
            format,
            width,
            height,
        })
    }

    fn decode_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.limits.max_image_dimension);
        limits.max_image_height = Some(self.limits.max_image_dimension);
        limits.max_alloc = Some(self.limits.max_decode_alloc_mb * 1024 * 1024);
        limits
    }
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Ico => "ico".to_string(),
        ImageFormat::Pnm => "pnm".to_string(),
        ImageFormat::Tga => "tga".to_string(),
        ImageFormat::Qoi => "qoi".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}
