//! Camera route handlers.

use super::stream::mjpeg_response;
use super::AppState;
use crate::device::DeviceRegistry;
use crate::encoding::EncodedImage;
use crate::error::{CameraError, ErrorClass};
use crate::storage::{self, PhotoError, SavedPhoto};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Maps a capture failure onto a status code and JSON body.
fn camera_error(err: &CameraError) -> Response {
    let status = match err.class() {
        ErrorClass::Client => StatusCode::BAD_REQUEST,
        ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn internal_error(message: impl std::fmt::Display) -> Response {
    tracing::error!("Request failed: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn jpeg_response(data: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        data,
    )
        .into_response()
}

/// Runs a blocking capture off the async workers.
async fn run_capture(
    state: &AppState,
    device_id: u32,
    save_dir: Option<PathBuf>,
) -> Result<Result<(EncodedImage, Option<SavedPhoto>), CameraError>, Response> {
    let manager = state.manager.clone();
    tokio::task::spawn_blocking(move || manager.capture(device_id, save_dir.as_deref()))
        .await
        .map_err(internal_error)
}

async fn snapshot(state: AppState, device_id: u32) -> Response {
    match run_capture(&state, device_id, None).await {
        Ok(Ok((image, _))) => jpeg_response(image.into_bytes()),
        Ok(Err(e)) => camera_error(&e),
        Err(response) => response,
    }
}

/// Snapshot from the upper camera.
pub(super) async fn upper(State(state): State<AppState>) -> Response {
    snapshot(state, 0).await
}

/// Snapshot from the lower camera.
pub(super) async fn lower(State(state): State<AppState>) -> Response {
    snapshot(state, 1).await
}

pub(super) async fn list_devices(State(state): State<AppState>) -> Response {
    Json(json!({ "devices": state.manager.list_devices() })).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CaptureQuery {
    device: Option<String>,
    save: Option<String>,
}

/// Resolves the `device` parameter from the query string or JSON body.
///
/// Accepts slot ids, numeric strings and device names; defaults to 0.
pub(super) fn select_device(
    registry: &DeviceRegistry,
    query: Option<&str>,
    body: Option<&Value>,
) -> Result<u32, CameraError> {
    if let Some(selector) = query {
        return registry.lookup(selector).map(|d| d.id);
    }
    match body.and_then(|b| b.get("device")) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(selector)) => registry.lookup(selector).map(|d| d.id),
        Some(Value::Number(n)) => {
            let id = n
                .as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| CameraError::InvalidDevice(n.to_string()))?;
            registry.resolve(id).map(|d| d.id)
        }
        Some(other) => Err(CameraError::InvalidDevice(other.to_string())),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Resolves the `save` flag from the query string or JSON body.
pub(super) fn save_requested(query: Option<&str>, body: Option<&Value>) -> bool {
    if query.is_some_and(is_truthy) {
        return true;
    }
    match body.and_then(|b| b.get("save")) {
        Some(Value::Bool(save)) => *save,
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        Some(Value::String(s)) => is_truthy(s),
        _ => false,
    }
}

fn json_body(headers: &HeaderMap, body: &Bytes) -> Option<Value> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json || body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// Takes a picture; with `save` the photo is stored and described as JSON.
pub(super) async fn capture(
    State(state): State<AppState>,
    Query(query): Query<CaptureQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = json_body(&headers, &body);
    let device_id =
        match select_device(state.manager.registry(), query.device.as_deref(), body.as_ref()) {
            Ok(id) => id,
            Err(e) => return camera_error(&e),
        };
    let save = save_requested(query.save.as_deref(), body.as_ref());

    let save_dir = if save {
        let dir = state.photos_dir.to_path_buf();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return camera_error(&CameraError::PersistenceFailed(format!(
                "{}: {}",
                dir.display(),
                e
            )));
        }
        Some(dir)
    } else {
        None
    };

    match run_capture(&state, device_id, save_dir).await {
        Ok(Ok((_, Some(saved)))) => Json(json!({
            "message": "Photo saved",
            "path": saved.path.display().to_string(),
            "filename": saved.filename,
            "url": format!("/camera/photos/{}", saved.filename),
        }))
        .into_response(),
        Ok(Ok((image, None))) => jpeg_response(image.into_bytes()),
        Ok(Err(e)) => camera_error(&e),
        Err(response) => response,
    }
}

/// Live MJPEG feed, suitable for an `<img src>`.
pub(super) async fn stream(
    State(state): State<AppState>,
    Path(device_id): Path<u32>,
) -> Response {
    if state.is_shutting_down() {
        return camera_error(&CameraError::DeviceUnavailable {
            device: device_id,
            reason: "server is shutting down".into(),
        });
    }
    let manager = state.manager.clone();
    let opened = tokio::task::spawn_blocking(move || manager.stream_frames(device_id)).await;
    match opened {
        Ok(Ok(frames)) => mjpeg_response(
            frames,
            state.shutdown_signal(),
            state.stream.frame_interval(),
        ),
        Ok(Err(e)) => camera_error(&e),
        Err(e) => internal_error(e),
    }
}

pub(super) async fn list_photos(State(state): State<AppState>) -> Response {
    let dir = state.photos_dir.to_path_buf();
    if !dir.is_dir() {
        return Json(json!({
            "photos": [],
            "message": "Photo directory not found (default: project_root/photos)",
        }))
        .into_response();
    }

    match tokio::task::spawn_blocking(move || storage::list_photos(&dir)).await {
        Ok(Ok(names)) => {
            let photos: Vec<Value> = names
                .into_iter()
                .map(|name| json!({ "url": format!("/camera/photos/{}", name), "filename": name }))
                .collect();
            Json(json!({ "photos": photos })).into_response()
        }
        Ok(Err(e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

pub(super) async fn get_photo(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let dir = state.photos_dir.as_path();
    if !dir.is_dir() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Photo directory not found" })),
        )
            .into_response();
    }

    let path = match storage::photo_path(dir, &filename) {
        Ok(path) => path,
        Err(PhotoError::InvalidFilename(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid filename" })),
            )
                .into_response()
        }
        Err(_) => {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
        }
    };

    match tokio::fs::read(&path).await {
        Ok(data) => jpeg_response(Bytes::from(data)),
        Err(e) => {
            tracing::debug!(path = %path.display(), "Failed to read photo: {}", e);
            (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
        }
    }
}
