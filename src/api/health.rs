use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;
use crate::batch::TaskCounts;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tasks: TaskCounts,
    pub max_tasks: usize,
}

/// Liveness probe with a summary of the task registry.
/// Never waits on a running batch.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tasks: state.tasks.counts().await,
        max_tasks: state.tasks.limits().max_tasks,
    })
}
