//! Transform options shared by every image in a batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use crate::error::ValidationError;

/// Quality used when none (or an unusable one) is supplied.
pub const DEFAULT_QUALITY: u8 = 80;

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Keep the format implied by the original file name
    #[default]
    Original,
    Jpeg,
    Png,
    Webp,
}

impl TargetFormat {
    /// Parse a format name (case-insensitive). Empty means `Original`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "original" => Some(Self::Original),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Original => "original",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        };
        f.write_str(name)
    }
}

/// Validated, normalized transform options. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    target_width: Option<NonZeroU32>,
    target_height: Option<NonZeroU32>,
    maintain_aspect_ratio: bool,
    output_format: TargetFormat,
    quality: u8,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            target_width: None,
            target_height: None,
            maintain_aspect_ratio: false,
            output_format: TargetFormat::Original,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl TransformSpec {
    /// Build a spec, normalizing as it goes: zero dimensions mean "unconstrained"
    /// and a missing or out-of-range quality falls back to the default.
    pub fn new(
        target_width: Option<u32>,
        target_height: Option<u32>,
        maintain_aspect_ratio: bool,
        output_format: TargetFormat,
        quality: Option<u32>,
    ) -> Self {
        Self {
            target_width: target_width.and_then(NonZeroU32::new),
            target_height: target_height.and_then(NonZeroU32::new),
            maintain_aspect_ratio,
            output_format,
            quality: normalize_quality(quality, DEFAULT_QUALITY),
        }
    }

    pub fn target_width(&self) -> Option<u32> {
        self.target_width.map(NonZeroU32::get)
    }

    pub fn target_height(&self) -> Option<u32> {
        self.target_height.map(NonZeroU32::get)
    }

    pub fn maintain_aspect_ratio(&self) -> bool {
        self.maintain_aspect_ratio
    }

    pub fn output_format(&self) -> TargetFormat {
        self.output_format
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// True when at least one target dimension is set.
    pub fn resizes(&self) -> bool {
        self.target_width.is_some() || self.target_height.is_some()
    }

    /// Reject target dimensions above `max`.
    pub fn check_dimensions(&self, max: u32) -> Result<(), ValidationError> {
        for (field, value) in [
            ("width", self.target_width()),
            ("height", self.target_height()),
        ] {
            if let Some(value) = value {
                if value > max {
                    return Err(ValidationError::DimensionTooLarge { field, value, max });
                }
            }
        }
        Ok(())
    }
}

fn normalize_quality(quality: Option<u32>, default: u8) -> u8 {
    match quality {
        Some(q @ 1..=100) => q as u8,
        _ => default,
    }
}

/// Option fields as they arrive from a form or the command line.
///
/// Every field is free text. Parsing is lenient the way HTML forms are:
/// numbers are read from their leading digits and anything unusable is
/// treated as unspecified. Only an unknown output format is an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformForm {
    pub width: Option<String>,
    pub height: Option<String>,
    pub quality: Option<String>,
    pub format: Option<String>,
    pub maintain_aspect_ratio: Option<String>,
}

impl TransformForm {
    /// Record a named form field. Unknown names are ignored.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        let slot = match field {
            "width" => &mut self.width,
            "height" => &mut self.height,
            "quality" => &mut self.quality,
            "format" => &mut self.format,
            "maintainAspectRatio" | "maintain_aspect_ratio" => &mut self.maintain_aspect_ratio,
            _ => return false,
        };
        *slot = Some(value.into());
        true
    }

    /// Normalize into a spec, using `default_quality` when quality is unusable.
    pub fn into_spec(self, default_quality: u8) -> Result<TransformSpec, ValidationError> {
        let output_format = match self.format.as_deref() {
            None => TargetFormat::Original,
            Some(raw) => TargetFormat::parse(raw).ok_or_else(|| ValidationError::InvalidOption {
                field: "format".to_string(),
                message: format!("'{raw}' is not one of original, jpeg, png, webp"),
            })?,
        };

        let mut spec = TransformSpec::new(
            self.width.as_deref().and_then(parse_leading_int),
            self.height.as_deref().and_then(parse_leading_int),
            self.maintain_aspect_ratio
                .as_deref()
                .map(parse_flag)
                .unwrap_or(false),
            output_format,
            None,
        );
        spec.quality = normalize_quality(
            self.quality.as_deref().and_then(parse_leading_int),
            default_quality,
        );
        Ok(spec)
    }
}

/// Read the leading decimal digits of a value ("200px" -> 200).
fn parse_leading_int(raw: &str) -> Option<u32> {
    let trimmed = raw.trim().trim_start_matches('+');
    let digits: &str = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &trimmed[..end],
        None => trimmed,
    };
    if digits.is_empty() {
        return None;
    }
    // Saturate absurdly long numbers; the dimension check rejects them later.
    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1" | "yes"
    )
}
