use axum::{Json, extract::State};
use runbox_process::{RunStatus, ScriptInfo};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub scripts: Vec<ScriptInfo>,
    pub runs: Vec<RunStatus>,
}

pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<Dashboard>> {
    let scripts = state.scripts().list().await?;
    let runs = state.manager.list_runs().await;
    Ok(Json(Dashboard { scripts, runs }))
}
