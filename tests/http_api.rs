//! HTTP surface tests driven through the router without a listener

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use smart_bgremove::{
    backends::MockSessionFactory,
    server::{self, AppState, IMAGE_TYPE_HEADER},
    ServiceConfig,
};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "smart-bgremove-test-boundary";
const BODY_LIMIT: usize = 16 * 1024 * 1024;

fn sample_png() -> Vec<u8> {
    let image = RgbImage::from_fn(64, 64, |x, y| {
        if (16..48).contains(&x) && (16..48).contains(&y) {
            Rgb([20, 120, 220])
        } else {
            Rgb([255, 255, 255])
        }
    });
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(uri: &str, filename: &str, content: &[u8]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart_body("file", filename, content)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn app_with(config: ServiceConfig, factory: MockSessionFactory) -> Router {
    let state = AppState::from_config(config, Arc::new(factory)).unwrap();
    server::router(Arc::new(state))
}

fn app() -> Router {
    let config = ServiceConfig::builder().storage_enabled(false).build().unwrap();
    app_with(config, MockSessionFactory::new())
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_and_health() {
    let response = app().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["health"], "/api/v1/health");

    let response = app().oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_icon_endpoint_returns_png_with_type_header() {
    let response = app()
        .oneshot(upload("/api/v1/remove-bg-icon", "logo.png", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let image_type = response.headers()[&IMAGE_TYPE_HEADER].to_str().unwrap().to_string();
    assert!(["icon", "sticker", "cartoon", "photo"].contains(&image_type.as_str()));

    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    let output = image::load_from_memory(&bytes).unwrap().to_rgba8();
    // White surround is keyed out and cropped away
    assert_eq!(output.dimensions(), (32, 32));
}

#[tokio::test]
async fn test_auto_detect_endpoint() {
    let response = app()
        .oneshot(upload("/api/v1/remove-bg-auto-detect", "photo.jpg", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(&IMAGE_TYPE_HEADER));
}

#[tokio::test]
async fn test_explicit_model_endpoint_has_no_type_header() {
    let response = app()
        .oneshot(upload("/api/v1/remove-bg/u2netp", "input.png", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key(&IMAGE_TYPE_HEADER));
}

#[tokio::test]
async fn test_invalid_model_name_is_server_error() {
    let response = app()
        .oneshot(upload("/api/v1/remove-bg/bad$model", "input.png", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "MODEL_LOAD_ERROR");
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let response = app()
        .oneshot(upload("/api/v1/remove-bg-icon", "empty.png", &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Empty file");
}

#[tokio::test]
async fn test_disallowed_extension_is_rejected() {
    let response = app()
        .oneshot(upload("/api/v1/remove-bg-icon", "anim.gif", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Invalid file type"));
}

#[tokio::test]
async fn test_oversized_file_is_rejected() {
    let config = ServiceConfig::builder()
        .storage_enabled(false)
        .max_file_size(1024)
        .build()
        .unwrap();
    let app = app_with(config, MockSessionFactory::new());

    let response = app
        .oneshot(upload("/api/v1/remove-bg-icon", "big.png", &vec![0u8; 4096]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("File too large"));
}

#[tokio::test]
async fn test_undecodable_image_is_client_error() {
    let response = app()
        .oneshot(upload("/api/v1/remove-bg-icon", "broken.png", b"not really a png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_truncated_upload_to_explicit_model_is_client_error() {
    let png = sample_png();
    let response = app()
        .oneshot(upload("/api/v1/remove-bg/u2net", "cut.png", &png[..png.len() / 2]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_IMAGE");
}

#[tokio::test]
async fn test_backend_failure_is_server_error() {
    let config = ServiceConfig::builder().storage_enabled(false).build().unwrap();
    let app = app_with(config, MockSessionFactory::new().with_failing_removal());

    let response = app
        .oneshot(upload("/api/v1/remove-bg-auto-detect", "input.png", &sample_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "REMOVAL_BACKEND_ERROR");
}

#[tokio::test]
async fn test_storage_stats_disabled() {
    let response = app().oneshot(get("/api/v1/storage/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_processed_pairs_are_stored() {
    let temp_dir = TempDir::new().unwrap();
    let config = ServiceConfig::builder()
        .storage_enabled(true)
        .storage_path(temp_dir.path())
        .build()
        .unwrap();
    let app = app_with(config, MockSessionFactory::new());

    let response = app
        .clone()
        .oneshot(upload("/api/v1/remove-bg-icon", "logo.png", &sample_png()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/v1/storage/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = json_body(response).await;
    assert_eq!(stats["total_input"], 1);
    assert_eq!(stats["total_output"], 1);
}

#[tokio::test]
async fn test_empty_prefix_mounts_at_root() {
    let config = ServiceConfig::builder()
        .storage_enabled(false)
        .api_prefix("")
        .build()
        .unwrap();
    let app = app_with(config, MockSessionFactory::new());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
