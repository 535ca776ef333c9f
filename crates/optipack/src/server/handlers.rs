//! Request handlers.

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde_json::{json, Value};

use super::error::ApiError;
use super::multipart::read_upload;
use super::AppState;
use optipack_core::ValidationError;

/// GET /health
pub async fn health_handler() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": optipack_core::VERSION,
        })),
    )
}

/// GET /api/presets
pub async fn presets_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "presets": state.service.presets() }))
}

/// POST /api/process
/// Transform one image and return it with size headers
pub async fn process_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let limits = &state.service.config().limits;
    let upload = read_upload(multipart, "image", 1, limits).await?;
    let item = upload
        .images
        .into_iter()
        .next()
        .ok_or(ValidationError::MissingImage)?;
    let spec = state.service.spec_from_form(upload.options)?;

    let output = state.service.process_one(item, spec).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, output.content_type)
        .header(header::CONTENT_DISPOSITION, attachment(&output.name))
        .header(header::CONTENT_LENGTH, output.optimized_size.to_string())
        .header("Original-Size", output.original_size.to_string())
        .header("Optimized-Size", output.optimized_size.to_string())
        .header("Reduction", output.reduction_label())
        .body(Body::from(output.bytes))
        .map_err(|e| ApiError::internal_error(format!("Failed to build response: {}", e)))
}

/// POST /api/process-batch
/// Transform many images and stream them back as one ZIP archive
pub async fn process_batch_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let limits = &state.service.config().limits;
    let upload = read_upload(multipart, "images", limits.max_batch_items, limits).await?;
    let spec = state.service.spec_from_form(upload.options)?;

    let download = state.service.process_batch(upload.images, spec)?;
    let disposition = attachment(&download.file_name);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(download.into_body_stream()))
        .map_err(|e| ApiError::internal_error(format!("Failed to build response: {}", e)))
}

/// `attachment; filename="..."` with characters that would break the header replaced.
fn attachment(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let (status, body) = health_handler().await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0["status"], "healthy");
    }

    #[test]
    fn test_attachment_escapes_quotes() {
        assert_eq!(attachment("a.jpeg"), "attachment; filename=\"a.jpeg\"");
        assert_eq!(attachment("we\"ird\n.png"), "attachment; filename=\"we_ird_.png\"");
    }
}
