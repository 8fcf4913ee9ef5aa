//! Route handlers

use super::error::ApiError;
use super::state::AppState;
use crate::classifier::ImageType;
use crate::processor::ProcessedImage;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Response header carrying the detected category
pub const IMAGE_TYPE_HEADER: HeaderName = HeaderName::from_static("x-image-type");

const RESULT_DISPOSITION: &str = "attachment; filename=\"result.png\"";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: &'static str,
    pub health: String,
}

/// Routes mounted under the configured API prefix
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/remove-bg-icon", post(remove_bg_icon))
        .route("/remove-bg-auto-detect", post(remove_bg_auto_detect))
        .route("/remove-bg/{model_name}", post(remove_bg_with_model))
        .route("/health", get(health))
        .route("/storage/stats", get(storage_stats))
}

/// `GET /`
pub async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: state.config.app_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        health: format!("{}/health", state.config.api_prefix),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[instrument(skip_all)]
async fn remove_bg_icon(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Response, ApiError> {
    let upload = read_upload(&state, multipart).await?;
    let result = state.processor.process_icon(&upload.bytes).await?;
    store_pair(&state, &upload, &result).await;

    Ok(png_response(result.bytes, Some(result.image_type)))
}

#[instrument(skip_all)]
async fn remove_bg_auto_detect(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(&state, multipart).await?;
    let result = state.processor.process_standard(&upload.bytes).await?;
    store_pair(&state, &upload, &result).await;

    Ok(png_response(result.bytes, Some(result.image_type)))
}

#[instrument(skip(state, multipart))]
async fn remove_bg_with_model(
    State(state): State<Arc<AppState>>,
    Path(model_name): Path<String>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(&state, multipart).await?;
    let bytes = state.processor.process_raw(&upload.bytes, &model_name).await?;

    Ok(png_response(bytes, None))
}

async fn storage_stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let storage = state
        .storage
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Storage is disabled".to_string()))?;

    let stats = storage.category_stats().await?;
    Ok(Json(stats).into_response())
}

/// Uploaded file from the `file` multipart field
#[derive(Debug)]
struct Upload {
    bytes: Vec<u8>,
    filename: Option<String>,
}

async fn read_upload(state: &AppState, mut multipart: Multipart) -> Result<Upload, ApiError> {
    let max_size = state.config.max_file_size;
    let mut upload = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(&e, max_size, "Failed to read multipart")),
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(ToString::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(&e, max_size, "Failed to read file data"))?;
        upload = Some(Upload {
            bytes: bytes.to_vec(),
            filename,
        });
    }

    let upload = upload
        .filter(|u| !u.bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Empty file".to_string()))?;

    if upload.bytes.len() > max_size {
        return Err(too_large(max_size));
    }

    if let Some(filename) = upload.filename.as_deref() {
        if !state.config.is_extension_allowed(filename) {
            return Err(ApiError::BadRequest(format!(
                "Invalid file type. Allowed extensions: {}",
                state.config.allowed_extensions.join(", ")
            )));
        }
    }

    info!(
        size = upload.bytes.len(),
        filename = upload.filename.as_deref().unwrap_or(""),
        "Received upload"
    );
    Ok(upload)
}

fn multipart_error(e: &MultipartError, max_size: usize, context: &str) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_size)
    } else {
        ApiError::BadRequest(format!("{context}: {}", e.body_text()))
    }
}

fn too_large(max_size: usize) -> ApiError {
    ApiError::BadRequest(format!(
        "File too large. Maximum size is {:.1}MB",
        max_size as f64 / (1024.0 * 1024.0)
    ))
}

async fn store_pair(state: &AppState, upload: &Upload, result: &ProcessedImage) {
    let Some(storage) = &state.storage else {
        return;
    };

    if let Err(e) = storage
        .save_pair(&upload.bytes, &result.bytes, result.image_type, upload.filename.as_deref())
        .await
    {
        warn!(error = %e, "Failed to store processed pair");
    }
}

fn png_response(bytes: Vec<u8>, image_type: Option<ImageType>) -> Response {
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CONTENT_DISPOSITION, RESULT_DISPOSITION),
        ],
        bytes,
    )
        .into_response();

    if let Some(image_type) = image_type {
        response
            .headers_mut()
            .insert(IMAGE_TYPE_HEADER, HeaderValue::from_static(image_type.as_str()));
    }
    response
}
