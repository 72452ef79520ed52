//! Router assembly: HTTP endpoints, the editor WebSocket, CORS, body limits and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Large enough for a base64-encoded data file at the 15 MB cap.
const BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Build the application router with:
/// - editor WebSocket at `/ws/editor`
/// - instructor API under `/assignment/instructor/...`
/// - student answer API under `/ns/...`
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let instructor = Router::new()
        .route("/datafiles", get(http::http_list_datafiles))
        .route("/datafile", post(http::http_create_datafile))
        .route("/datafile_options", get(http::http_datafile_options))
        .route("/datafile_preview", get(http::http_datafile_preview))
        .route("/preview", post(http::http_preview))
        .route("/validate", post(http::http_validate))
        .route("/assignment_exercises/:assignment_id", get(http::http_assignment_exercises))
        .route("/assignment_exercise", post(http::http_add_assignment_exercise))
        .route("/exercise", post(http::http_save_exercise))
        .route("/available_readings", get(http::http_available_readings))
        .route("/readings/add", post(http::http_add_readings))
        .route("/readings/remove", post(http::http_remove_readings))
        .route("/readings/:assignment_id", get(http::http_readings_overview))
        .route("/accommodation", post(http::http_save_accommodation))
        .route(
            "/accommodations",
            get(http::http_list_accommodations).post(http::http_save_accommodations),
        );

    let student = Router::new()
        .route("/logger/bookevent", post(http::http_log_event))
        .route("/logger/upload/:div_id", post(http::http_upload))
        .route("/assessment/has_attachment/:div_id", get(http::http_has_attachment))
        .route("/assessment/results/:div_id", get(http::http_results));

    Router::new()
        .route("/ws/editor", get(ws::ws_editor))
        .route("/api/v1/health", get(http::http_health))
        .nest("/assignment/instructor", instructor)
        .nest("/ns", student)
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
