use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use runbox_process::RunId;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

pub mod dashboard;
pub mod health;
pub mod runs;
pub mod scripts;

pub const DASHBOARD_PATH: &str = "/dashboard";
/// Human-readable outcome of a mutating request (what a flash message would show).
pub const NOTICE_HEADER: &str = "x-runbox-notice";
pub const RUN_ID_HEADER: &str = "x-run-id";

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/upload", post(scripts::upload))
        .route(DASHBOARD_PATH, get(dashboard::dashboard))
        .route("/start/:filename", get(scripts::start))
        .route("/delete/:filename", get(scripts::delete))
        .route("/download/:filename", get(scripts::download))
        .route("/stop/:run_id", get(runs::stop))
        .route("/view_log/:run_id", get(runs::view_log))
        .route("/api/processes", get(runs::list))
        .route("/health", get(health::health))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("not found".to_string())
}

/// 303 to the dashboard carrying the notice (and run id, if any) as headers.
pub(crate) fn back_to_dashboard(notice: &str, run_id: Option<&RunId>) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(notice) {
        headers.insert(HeaderName::from_static(NOTICE_HEADER), v);
    }
    if let Some(id) = run_id
        && let Ok(v) = HeaderValue::from_str(id.as_str())
    {
        headers.insert(HeaderName::from_static(RUN_ID_HEADER), v);
    }
    (headers, Redirect::to(DASHBOARD_PATH)).into_response()
}
