use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Runs currently in the registry, running or not.
    pub processes: usize,
    /// Spawns queued or in flight.
    pub pending: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        processes: state.manager.run_count().await,
        pending: state.queue.pending(),
    })
}
