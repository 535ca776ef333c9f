//! Single-image transformation: decode, resize, re-encode.

use bytes::Bytes;
use image::imageops::FilterType;
use image::GenericImageView;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::decode::ImageDecoder;
use super::encode;
use super::resize::{self, parse_filter};
use super::spec::TransformSpec;
use crate::config::{Config, LimitsConfig};
use crate::error::TransformError;
use crate::types::{InputItem, OutputItem};

/// One unit of work in a batch.
///
/// Implementations are synchronous and may block on CPU-bound work; the
/// coordinator runs them on the blocking thread pool. `cancel` is checked
/// between stages so a cancelled or timed-out item stops early.
pub trait ImageTransform: Send + Sync {
    fn transform(
        &self,
        item: &InputItem,
        spec: &TransformSpec,
        cancel: &CancellationToken,
    ) -> Result<OutputItem, TransformError>;
}

/// Production transformer built on the `image` codecs.
#[derive(Debug, Clone)]
pub struct ImageTransformer {
    decoder: ImageDecoder,
    filter: FilterType,
    limits: LimitsConfig,
}

impl ImageTransformer {
    /// Create a transformer from configuration.
    ///
    /// An unknown resize filter falls back to Lanczos3; `Config::validate`
    /// rejects those before they get here.
    pub fn new(config: &Config) -> Self {
        Self {
            decoder: ImageDecoder::new(config.limits.clone()),
            filter: parse_filter(&config.processing.resize_filter).unwrap_or(FilterType::Lanczos3),
            limits: config.limits.clone(),
        }
    }
}

impl ImageTransform for ImageTransformer {
    fn transform(
        &self,
        item: &InputItem,
        spec: &TransformSpec,
        cancel: &CancellationToken,
    ) -> Result<OutputItem, TransformError> {
        let start = Instant::now();
        tracing::debug!("Transforming: {}", item.name);

        let decoded = self.decoder.decode(&item.bytes, &item.name)?;
        tracing::trace!("  Decode: {:?}", start.elapsed());
        checkpoint(cancel)?;

        let extension = item.extension();
        let encoding = encode::resolve(spec.output_format(), extension.as_deref(), decoded.format)?;

        let resize_start = Instant::now();
        let image = resize::apply(decoded.image, spec, self.filter, &self.limits)?;
        tracing::trace!("  Resize: {:?}", resize_start.elapsed());
        checkpoint(cancel)?;

        let encode_start = Instant::now();
        let bytes = encode::encode(&image, &encoding, spec.quality())?;
        tracing::trace!("  Encode: {:?}", encode_start.elapsed());

        let (width, height) = image.dimensions();
        let output = OutputItem {
            name: format!("{}.{}", item.stem(), encoding.extension),
            original_size: item.size_bytes(),
            optimized_size: bytes.len() as u64,
            bytes: Bytes::from(bytes),
            width,
            height,
            content_type: encoding.content_type(),
        };

        tracing::debug!(
            "Transformed {} -> {} in {:?} ({}x{}, {} -> {} bytes)",
            item.name,
            output.name,
            start.elapsed(),
            width,
            height,
            output.original_size,
            output.optimized_size
        );
        Ok(output)
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), TransformError> {
    if cancel.is_cancelled() {
        Err(TransformError::Cancelled)
    } else {
        Ok(())
    }
}
