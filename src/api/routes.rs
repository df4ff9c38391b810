use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::AppState;

// Camera photos routinely exceed axum's 2 MiB default.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/photos",
            post(handlers::upload_photo).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // static segments before the parameterised one
        .route("/faces/next", get(handlers::next_face))
        .route("/faces/pending", get(handlers::pending_faces))
        .route("/faces/:uuid/name", post(handlers::name_face))
        .route("/persons/:name/photos", get(handlers::person_photos))
        .route("/command", post(handlers::command))
        .route("/fetchImage", get(handlers::fetch_image))
        .route("/fetchOriginal", get(handlers::fetch_original))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
