//! Resize geometry and resampling.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use super::spec::TransformSpec;
use crate::config::LimitsConfig;
use crate::error::TransformError;

/// Parse a resize filter name from configuration.
pub fn parse_filter(name: &str) -> Option<FilterType> {
    match name.trim().to_ascii_lowercase().as_str() {
        "nearest" => Some(FilterType::Nearest),
        "triangle" | "bilinear" => Some(FilterType::Triangle),
        "catmullrom" | "bicubic" => Some(FilterType::CatmullRom),
        "gaussian" => Some(FilterType::Gaussian),
        "lanczos3" | "lanczos" => Some(FilterType::Lanczos3),
        _ => None,
    }
}

/// Compute the output dimensions for a source of `width x height`.
///
/// Returns `None` when no resize is needed: no target dimension is set, or
/// the target equals the source.
///
/// - Both targets with aspect ratio kept: the largest size that fits inside
///   the box, scaled uniformly.
/// - Both targets without aspect ratio: exactly the box.
/// - One target: that axis is fixed and the other scales proportionally.
pub fn target_dimensions(width: u32, height: u32, spec: &TransformSpec) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let (w, h) = (width as f64, height as f64);

    let target = match (spec.target_width(), spec.target_height()) {
        (None, None) => return None,
        (Some(tw), Some(th)) if spec.maintain_aspect_ratio() => {
            let scale = (tw as f64 / w).min(th as f64 / h);
            (scaled(w, scale).min(tw), scaled(h, scale).min(th))
        }
        (Some(tw), Some(th)) => (tw, th),
        (Some(tw), None) => (tw, scaled(h, tw as f64 / w)),
        (None, Some(th)) => (scaled(w, th as f64 / h), th),
    };

    if target == (width, height) {
        None
    } else {
        Some(target)
    }
}

fn scaled(length: f64, scale: f64) -> u32 {
    let value = (length * scale).round();
    if value < 1.0 {
        1
    } else if value >= u32::MAX as f64 {
        u32::MAX
    } else {
        value as u32
    }
}

/// Reject an output size the limits do not allow.
///
/// Each axis must stay within `max_image_dimension`, and the output buffer at
/// `bytes_per_pixel` must fit in `max_decode_alloc_mb`.
pub fn check_target(
    width: u32,
    height: u32,
    bytes_per_pixel: u8,
    limits: &LimitsConfig,
) -> Result<(), TransformError> {
    let too_large = |reason: String| TransformError::OutputTooLarge {
        width,
        height,
        reason,
    };

    let max = limits.max_image_dimension;
    if width > max || height > max {
        return Err(too_large(format!("dimension above {max}")));
    }

    let bytes = width as u64 * height as u64 * bytes_per_pixel.max(1) as u64;
    let budget = limits.max_decode_alloc_mb.saturating_mul(1024 * 1024);
    if bytes > budget {
        return Err(too_large(format!(
            "{bytes} bytes above the {} MB allocation limit",
            limits.max_decode_alloc_mb
        )));
    }
    Ok(())
}

/// Resize `image` according to `spec`, returning it untouched when no resize applies.
///
/// The target is checked against `limits` before any pixel buffer is allocated.
pub fn apply(
    image: DynamicImage,
    spec: &TransformSpec,
    filter: FilterType,
    limits: &LimitsConfig,
) -> Result<DynamicImage, TransformError> {
    let (width, height) = image.dimensions();
    match target_dimensions(width, height, spec) {
        Some((tw, th)) => {
            check_target(tw, th, image.color().bytes_per_pixel(), limits)?;
            tracing::trace!("  Resize: {}x{} -> {}x{}", width, height, tw, th);
            Ok(image.resize_exact(tw, th, filter))
        }
        None => Ok(image),
    }
}
