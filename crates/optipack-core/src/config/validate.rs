//! Configuration validation with range checks.

use crate::archive::ArchiveCompression;
use crate::error::ConfigError;
use crate::pipeline::resize::parse_filter;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if parse_filter(&self.processing.resize_filter).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "processing.resize_filter '{}' is not one of nearest, triangle, catmullrom, gaussian, lanczos3",
                self.processing.resize_filter
            )));
        }
        if !(1..=100).contains(&self.processing.default_quality) {
            return Err(ConfigError::ValidationError(
                "processing.default_quality must be between 1 and 100".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_batch_items == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_batch_items must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.max_decode_alloc_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_decode_alloc_mb must be > 0".into(),
            ));
        }
        if self.limits.item_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.item_timeout_ms must be > 0".into(),
            ));
        }
        if self.archive.file_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "archive.file_name must not be empty".into(),
            ));
        }
        if ArchiveCompression::parse(&self.archive.compression).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "archive.compression '{}' must be 'deflate' or 'stored'",
                self.archive.compression
            )));
        }
        if self.archive.stream_buffer_kb == 0 {
            return Err(ConfigError::ValidationError(
                "archive.stream_buffer_kb must be > 0".into(),
            ));
        }
        for preset in &self.presets {
            if preset.width == 0 || preset.height == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "preset '{}' must have non-zero width and height",
                    preset.name
                )));
            }
        }
        Ok(())
    }
}
