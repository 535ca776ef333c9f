//! Output format resolution and encoding.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use super::spec::TargetFormat;
use crate::error::TransformError;

/// Formats written through the `image` crate without format-specific options.
const PASSTHROUGH_FORMATS: &[ImageFormat] = &[
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::Ico,
    ImageFormat::Tga,
    ImageFormat::Pnm,
    ImageFormat::Qoi,
];

/// The concrete format an item will be written in, plus its file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEncoding {
    pub format: ImageFormat,
    pub extension: String,
}

impl OutputEncoding {
    fn new(format: ImageFormat, extension: impl Into<String>) -> Self {
        Self {
            format,
            extension: extension.into(),
        }
    }

    /// Canonical encoding for a format, if it can be written.
    fn for_format(format: ImageFormat) -> Option<Self> {
        let extension = match format {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Pnm => "ppm",
            f if PASSTHROUGH_FORMATS.contains(&f) => f.extensions_str().first().copied()?,
            _ => return None,
        };
        Some(Self::new(format, extension))
    }

    /// MIME type for the response header.
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Decide the output format.
///
/// An explicit target wins. For `Original` the extension of the uploaded name
/// decides, keeping the caller's spelling (`.jpg` stays `.jpg`). When that
/// extension is unknown or cannot be written, the image is re-encoded in the
/// format it was decoded from; if even that cannot be written the item fails
/// with `UnsupportedFormat`.
pub fn resolve(
    target: TargetFormat,
    extension: Option<&str>,
    detected: ImageFormat,
) -> Result<OutputEncoding, TransformError> {
    match target {
        TargetFormat::Jpeg => return Ok(OutputEncoding::new(ImageFormat::Jpeg, "jpeg")),
        TargetFormat::Png => return Ok(OutputEncoding::new(ImageFormat::Png, "png")),
        TargetFormat::Webp => return Ok(OutputEncoding::new(ImageFormat::WebP, "webp")),
        TargetFormat::Original => {}
    }

    if let Some(ext) = extension {
        if let Some(format) = ImageFormat::from_extension(ext) {
            if OutputEncoding::for_format(format).is_some() {
                return Ok(OutputEncoding::new(format, ext));
            }
        }
        tracing::debug!(
            "Extension '{}' is not writable, falling back to detected {:?}",
            ext,
            detected
        );
    }

    OutputEncoding::for_format(detected).ok_or_else(|| TransformError::UnsupportedFormat {
        format: extension
            .map(str::to_string)
            .unwrap_or_else(|| super::decode::format_to_string(detected)),
    })
}

/// Encode `image` in the resolved format. `quality` applies to JPEG and WebP.
pub fn encode(
    image: &DynamicImage,
    encoding: &OutputEncoding,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    let encode_err = |message: String| TransformError::Encode {
        format: encoding.extension.clone(),
        message,
    };

    match encoding.format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel; flatten to 8-bit RGB or luma first.
            let flattened = match image {
                DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => None,
                other if other.color().has_color() => {
                    Some(DynamicImage::ImageRgb8(other.to_rgb8()))
                }
                other => Some(DynamicImage::ImageLuma8(other.to_luma8())),
            };
            let source = flattened.as_ref().unwrap_or(image);

            let mut buffer = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            source
                .write_with_encoder(encoder)
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(buffer)
        }
        ImageFormat::Png => {
            let mut buffer = Vec::new();
            image
                .write_with_encoder(PngEncoder::new(&mut buffer))
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(buffer)
        }
        ImageFormat::WebP => {
            let rgba = image.to_rgba8();
            let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
            let memory = encoder
                .encode_simple(false, quality as f32)
                .map_err(|e| encode_err(format!("{:?}", e)))?;
            Ok(memory.to_vec())
        }
        format => {
            let mut buffer = Cursor::new(Vec::new());
            image
                .write_to(&mut buffer, format)
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(buffer.into_inner())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    #[test]
    fn test_explicit_target_wins() {
        let enc = resolve(TargetFormat::Webp, Some("png"), ImageFormat::Png).unwrap();
        assert_eq!(enc, OutputEncoding::new(ImageFormat::WebP, "webp"));
        assert_eq!(enc.content_type(), "image/webp");
    }

    #[test]
    fn test_original_keeps_extension_spelling() {
        let enc = resolve(TargetFormat::Original, Some("jpg"), ImageFormat::Jpeg).unwrap();
        assert_eq!(enc.format, ImageFormat::Jpeg);
        assert_eq!(enc.extension, "jpg");
    }

    #[test]
    fn test_original_passthrough_format() {
        let enc = resolve(TargetFormat::Original, Some("gif"), ImageFormat::Gif).unwrap();
        assert_eq!(enc.format, ImageFormat::Gif);
        assert_eq!(enc.extension, "gif");
    }

    #[test]
    fn test_unknown_extension_falls_back_to_detected() {
        let enc = resolve(TargetFormat::Original, Some("heic"), ImageFormat::Png).unwrap();
        assert_eq!(enc, OutputEncoding::new(ImageFormat::Png, "png"));

        let enc = resolve(TargetFormat::Original, None, ImageFormat::Jpeg).unwrap();
        assert_eq!(enc.extension, "jpeg");
    }

    #[test]
    fn test_unwritable_detected_format_is_unsupported() {
        let err = resolve(TargetFormat::Original, Some("heic"), ImageFormat::Avif).unwrap_err();
        assert_eq!(
            err,
            TransformError::UnsupportedFormat {
                format: "heic".to_string()
            }
        );
    }

    #[test]
    fn test_encode_jpeg_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([10, 20, 30, 128])));
        let enc = OutputEncoding::new(ImageFormat::Jpeg, "jpeg");
        let bytes = encode(&img, &enc, 80).unwrap();
        assert_eq!(&bytes[..3], &[0xFFu8, 0xD8, 0xFF]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (20, 10));
    }

    #[test]
    fn test_encode_jpeg_quality_changes_size() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8])
        }));
        let enc = OutputEncoding::new(ImageFormat::Jpeg, "jpeg");
        let low = encode(&img, &enc, 10).unwrap();
        let high = encode(&img, &enc, 95).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_encode_png_ignores_quality() {
        let img = DynamicImage::new_rgb8(16, 16);
        let enc = OutputEncoding::new(ImageFormat::Png, "png");
        let a = encode(&img, &enc, 1).unwrap();
        let b = encode(&img, &enc, 100).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[1..4], b"PNG");
    }

    #[test]
    fn test_encode_webp() {
        let img = DynamicImage::new_rgb8(32, 32);
        let enc = OutputEncoding::new(ImageFormat::WebP, "webp");
        let bytes = encode(&img, &enc, 75).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn test_encode_passthrough_bmp() {
        let img = DynamicImage::new_rgb8(4, 4);
        let enc = OutputEncoding::new(ImageFormat::Bmp, "bmp");
        let bytes = encode(&img, &enc, 80).unwrap();
        assert_eq!(&bytes[0..2], b"BM");
    }
}
