use axum::{
    Router,
    routing::{get, post},
};

use super::AppState;
use super::{batch, classify};

/// API routes
///
/// ## Classification
/// - POST /classify - Classify one record (delimited row or structured line)
/// - POST /classify/batch - Submit files for background classification
///
/// ## Batch Tasks
/// - GET  /batch - List task snapshots, newest first
/// - GET  /batch/{task_id} - Get task status
/// - GET  /batch/{task_id}/results - Get results of a completed task
/// - POST /batch/{task_id}/cancel - Cancel a running task
/// - GET  /batch/{task_id}/events - SSE stream of task progress
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // ========================================
        // Classification
        // ========================================
        .route("/classify", post(classify::classify_record))
        .route("/classify/batch", post(batch::submit_batch))
        // ========================================
        // Batch Tasks
        // ========================================
        .route("/batch", get(batch::list_tasks))
        .route("/batch/{task_id}", get(batch::get_task_status))
        .route("/batch/{task_id}/results", get(batch::get_task_results))
        .route("/batch/{task_id}/cancel", post(batch::cancel_task))
        .route("/batch/{task_id}/events", get(batch::task_events))
}
