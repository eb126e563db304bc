use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderValue, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use runbox_process::{RunId, RunStatus, StopOutcome};

use crate::error::{ApiError, ApiResult};
use crate::routes::back_to_dashboard;
use crate::state::AppState;

pub async fn stop(State(state): State<AppState>, Path(run_id): Path<String>) -> ApiResult<Response> {
    match state.manager.stop(&run_id).await {
        StopOutcome::Stopped => Ok(back_to_dashboard(
            &format!("Process {run_id} stopped successfully"),
            None,
        )),
        StopOutcome::NotFound => Err(ApiError::NotFound("process not found".to_string())),
    }
}

pub async fn view_log(State(state): State<AppState>, Path(run_id): Path<String>) -> ApiResult<Response> {
    // Ids double as file names; anything outside the id alphabet cannot have a log.
    let Some(id) = RunId::parse(&run_id) else {
        return Err(ApiError::NotFound("log file not found".to_string()));
    };
    let Some(text) = state.manager.read_log(&id).await? else {
        return Err(ApiError::NotFound("log file not found".to_string()));
    };

    Ok((
        [(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        text,
    )
        .into_response())
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<RunStatus>> {
    Json(state.manager.list_runs().await)
}
