//! HTTP server: routes, shared state and startup.

mod error;
mod handlers;
mod multipart;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use optipack_core::BatchService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use handlers::{health_handler, presets_handler, process_batch_handler, process_handler};

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BatchService>,
}

/// Create router with all routes and middleware.
pub fn create_router(service: BatchService, static_dir: Option<PathBuf>) -> Router {
    let config = service.config();
    let body_limit = config.limits.max_request_bytes();
    let cors = config.server.cors;
    let state = AppState {
        service: Arc::new(service),
    };

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/presets", get(presets_handler))
        .route("/api/process", post(process_handler))
        .route("/api/process-batch", post(process_batch_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    if let Some(dir) = static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }
    if cors {
        router = router.layer(CorsLayer::permissive());
    }
    router.layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(
    service: BatchService,
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let router = create_router(service, static_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
    use optipack_core::Config;
    use std::io::{Cursor, Read};
    use tower::ServiceExt;

    const BOUNDARY: &str = "optipack-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, Vec<u8>),
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn multipart_request(uri: &str, parts: Vec<Part<'_>>) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File(name, file_name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn router() -> Router {
        create_router(BatchService::new(Config::default()), None)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_presets_endpoint() {
        let response = router()
            .oneshot(Request::get("/api/presets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let presets = body["presets"].as_array().unwrap();
        assert_eq!(presets.len(), 4);
        assert_eq!(presets[0]["name"], "Thumbnail");
        assert_eq!(presets[0]["width"], 150);
    }

    #[tokio::test]
    async fn test_process_returns_size_headers() {
        let request = multipart_request(
            "/api/process",
            vec![
                Part::File("image", "wide.png", png(400, 100)),
                Part::Text("width", "200"),
                Part::Text("height", "200"),
                Part::Text("maintainAspectRatio", "true"),
                Part::Text("format", "jpeg"),
                Part::Text("quality", "80"),
            ],
        );
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "content-type"), "image/jpeg");
        assert_eq!(
            header_str(&response, "content-disposition"),
            "attachment; filename=\"wide.jpeg\""
        );

        let original: u64 = header_str(&response, "original-size").parse().unwrap();
        let optimized: u64 = header_str(&response, "optimized-size").parse().unwrap();
        let expected = format!(
            "{:.1}",
            (original as f64 - optimized as f64) / original as f64 * 100.0
        );
        assert_eq!(header_str(&response, "reduction"), expected);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.len() as u64, optimized);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (200, 50));
    }

    #[tokio::test]
    async fn test_process_without_image_is_bad_request() {
        let request = multipart_request("/api/process", vec![Part::Text("width", "100")]);
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("No image"));
    }

    #[tokio::test]
    async fn test_process_corrupt_image_is_error() {
        let request = multipart_request(
            "/api/process",
            vec![Part::File("image", "broken.png", b"not really a png".to_vec())],
        );
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body["kind"], "decode");
    }

    #[tokio::test]
    async fn test_process_rejects_unknown_format() {
        let request = multipart_request(
            "/api/process",
            vec![
                Part::File("image", "a.png", png(10, 10)),
                Part::Text("format", "bmp2"),
            ],
        );
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_without_images_is_bad_request() {
        let request = multipart_request("/api/process-batch", vec![Part::Text("format", "webp")]);
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_rejects_oversized_item() {
        let mut config = Config::default();
        config.limits.max_file_size_mb = 1;
        let router = create_router(BatchService::new(config), None);

        let request = multipart_request(
            "/api/process-batch",
            vec![Part::File("images", "huge.png", vec![0u8; 1024 * 1024 + 10])],
        );
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_streams_zip() {
        let request = multipart_request(
            "/api/process-batch",
            vec![
                Part::File("images", "square.png", png(100, 100)),
                Part::File("images", "wide.png", png(2000, 500)),
                Part::File("images", "corrupt.png", b"garbage".to_vec()),
                Part::File("images", "tall.png", png(500, 2000)),
                Part::Text("width", "200"),
                Part::Text("height", "200"),
                Part::Text("maintainAspectRatio", "true"),
                Part::Text("format", "jpeg"),
            ],
        );
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "content-type"), "application/zip");
        assert_eq!(
            header_str(&response, "content-disposition"),
            "attachment; filename=\"imagens_otimizadas.zip\""
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(archive.len(), 3);

        let mut names = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            names.push(file.name().to_string());
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            let (w, h) = image::load_from_memory(&data).unwrap().dimensions();
            assert!(w <= 200 && h <= 200);
        }
        assert_eq!(names, vec!["square.jpeg", "wide.jpeg", "tall.jpeg"]);
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
