use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{error, warn};

use crate::error::PipelineError;
use crate::labeling::{self, commands::{self, Command, Reply}};
use crate::pipeline::ingest;
use crate::AppState;

/// Maps a pipeline failure onto a status code. The body carries a generic
/// message only; the detail goes to the log.
fn error_response(context: &str, e: PipelineError) -> Response {
    let (status, message) = match &e {
        PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, "not found"),
        PipelineError::Decode(_)
        | PipelineError::InvalidRectangle { .. }
        | PipelineError::InvalidKey(_)
        | PipelineError::InvalidName(_)
        | PipelineError::MalformedJob(_) => (StatusCode::BAD_REQUEST, "invalid input"),
        PipelineError::StoreUnavailable(_) | PipelineError::QueueUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "temporarily unavailable, retry later")
        }
        PipelineError::Detection(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
    };
    if status.is_server_error() {
        error!("{} failed: {}", context, e);
    } else {
        warn!("{} rejected: {}", context, e);
    }
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.stats.uptime_secs(),
    });
    (StatusCode::OK, Json(body))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.stats.metrics_text(),
    )
}

pub async fn upload_photo(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match ingest::upload_and_ingest(&state, body).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response("photo upload", e),
    }
}

pub async fn next_face(State(state): State<Arc<AppState>>) -> Response {
    match labeling::next_unlabeled(state.faces.as_ref()).await {
        Ok(Some(key)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "key": key.to_string(), "face_uuid": key.face_uuid() })),
        )
            .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("next face", e),
    }
}

pub async fn pending_faces(State(state): State<Arc<AppState>>) -> Response {
    match labeling::pending_count(state.faces.as_ref()).await {
        Ok(pending) => (StatusCode::OK, Json(serde_json::json!({ "pending": pending }))).into_response(),
        Err(e) => error_response("pending count", e),
    }
}

#[derive(Deserialize)]
pub struct NameReq {
    pub name: String,
}

pub async fn name_face(
    State(state): State<Arc<AppState>>,
    Path(face_uuid): Path<String>,
    Json(req): Json<NameReq>,
) -> Response {
    match labeling::rename(state.faces.as_ref(), &face_uuid, &req.name).await {
        Ok(key) => {
            state.stats.inc_faces_named();
            (StatusCode::OK, Json(serde_json::json!({ "key": key.to_string() }))).into_response()
        }
        Err(e) => error_response("face rename", e),
    }
}

pub async fn person_photos(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match labeling::photos_for(state.faces.as_ref(), &name).await {
        Ok(photo_ids) => (
            StatusCode::OK,
            Json(serde_json::json!({ "name": name.trim().to_lowercase(), "photo_ids": photo_ids })),
        )
            .into_response(),
        Err(e) => error_response("person lookup", e),
    }
}

#[derive(Deserialize)]
pub struct CommandReq {
    pub text: String,
}

pub async fn command(State(state): State<Arc<AppState>>, Json(req): Json<CommandReq>) -> impl IntoResponse {
    let reply = commands::dispatch(state.faces.as_ref(), Command::parse(&req.text)).await;
    if matches!(reply, Reply::Named { .. }) {
        state.stats.inc_faces_named();
    }
    let text = reply.to_string();
    (StatusCode::OK, Json(serde_json::json!({ "reply": reply, "text": text })))
}

#[derive(Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

fn jpeg(bytes: Bytes) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()
}

pub async fn fetch_image(State(state): State<Arc<AppState>>, Query(q): Query<KeyQuery>) -> Response {
    match state.faces.get(&q.key).await {
        Ok(bytes) => jpeg(bytes),
        Err(e) => error_response("crop fetch", e),
    }
}

pub async fn fetch_original(State(state): State<Arc<AppState>>, Query(q): Query<KeyQuery>) -> Response {
    match state.photos.get(&q.key).await {
        Ok(bytes) => jpeg(bytes),
        Err(e) => error_response("photo fetch", e),
    }
}
