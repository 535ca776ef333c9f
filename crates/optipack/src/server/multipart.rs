//! Multipart upload parsing.
//!
//! File fields are read chunk by chunk so an oversized upload is rejected as
//! soon as it crosses the per-item ceiling instead of after it is buffered.

use axum::extract::Multipart;
use bytes::BytesMut;
use optipack_core::config::LimitsConfig;
use optipack_core::{InputItem, TransformForm, ValidationError};

use super::error::ApiError;

/// Files and option fields from one upload.
#[derive(Debug, Default)]
pub struct Upload {
    pub images: Vec<InputItem>,
    pub options: TransformForm,
}

/// Read every field of a multipart request.
///
/// Fields named `file_field` become images; at most `max_images` are
/// accepted. Other fields are treated as transform options and unknown ones
/// are ignored.
pub async fn read_upload(
    mut multipart: Multipart,
    file_field: &str,
    max_images: usize,
    limits: &LimitsConfig,
) -> Result<Upload, ApiError> {
    let max_bytes = limits.max_item_bytes();
    let mut upload = Upload::default();

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();

        if field_name == file_field {
            if upload.images.len() >= max_images {
                return Err(ValidationError::TooManyItems {
                    count: upload.images.len() + 1,
                    max: max_images,
                }
                .into());
            }

            let file_name = field.file_name().unwrap_or("image").to_string();
            let mut buffer = BytesMut::new();
            while let Some(chunk) = field.chunk().await? {
                let size = (buffer.len() + chunk.len()) as u64;
                if size > max_bytes {
                    return Err(ValidationError::ItemTooLarge {
                        name: file_name,
                        size_bytes: size,
                        max_bytes,
                    }
                    .into());
                }
                buffer.extend_from_slice(&chunk);
            }

            tracing::debug!("Received {} ({} bytes)", file_name, buffer.len());
            upload.images.push(InputItem::new(file_name, buffer.freeze()));
        } else {
            let value = field.text().await?;
            if !upload.options.set(&field_name, value) {
                tracing::debug!("Ignoring form field: {}", field_name);
            }
        }
    }

    Ok(upload)
}
