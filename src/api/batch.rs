use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::AppState;
use super::error::{ApiError, invalid_body, task_error};
use crate::batch::{Counts, SubmittedFile, group_by_file, parse_task_id};
use crate::models::{FileFormat, PerRecordResult, TaskSnapshot, TaskStatus};

// ============================================
// SSE Stream for Task Events
// ============================================

/// A stream that delivers task progress events to connected clients
struct TaskEventStream {
    rx: mpsc::Receiver<Event>,
}

impl Stream for TaskEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================
// Request/Response Types
// ============================================

#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    #[serde(default)]
    pub files: Vec<SubmittedFile>,
    /// Skip the first line of every delimited file
    #[serde(default = "default_has_header")]
    pub has_header: bool,
}

fn default_has_header() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SubmitBatchResponse {
    pub success: bool,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub total_files: usize,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub success: bool,
    pub task: TaskSnapshot,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub success: bool,
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct CancelTaskResponse {
    pub success: bool,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub message: String,
}

/// Provenance and counts of one processed file
#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub filename: String,
    pub format: FileFormat,
    pub lines: usize,
    pub sha256: String,
    pub total_count: usize,
    pub malicious_count: usize,
    pub error_count: usize,
    pub non_malicious_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TaskResultsResponse {
    pub success: bool,
    pub task_id: Uuid,
    pub total_count: usize,
    pub malicious_count: usize,
    pub error_count: usize,
    pub non_malicious_count: usize,
    pub files_processed: usize,
    pub files: Vec<FileSummary>,
    pub results: Vec<PerRecordResult>,
}

// ============================================
// Handlers
// ============================================

/// Submit a batch of files for background classification.
///
/// Returns as soon as the task is registered; poll the status endpoint
/// (or subscribe to its events) to follow progress.
pub async fn submit_batch(
    State(state): State<AppState>,
    body: Result<Json<SubmitBatchRequest>, JsonRejection>,
) -> Result<Json<SubmitBatchResponse>, ApiError> {
    let Json(req) = body.map_err(invalid_body)?;

    let snapshot = state
        .tasks
        .create(req.files, req.has_header)
        .await
        .map_err(task_error)?;

    Ok(Json(SubmitBatchResponse {
        success: true,
        task_id: snapshot.task_id,
        status: snapshot.status,
        total_files: snapshot.total_files,
    }))
}

pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        success: true,
        tasks: state.tasks.list().await,
    })
}

pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let id = parse_task_id(&task_id).map_err(task_error)?;
    let task = state.tasks.status(id).await.map_err(task_error)?;
    Ok(Json(TaskStatusResponse {
        success: true,
        task,
    }))
}

/// Results of a completed task, with overall and per-file counts.
/// Any other state is answered with 409.
pub async fn get_task_results(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResultsResponse>, ApiError> {
    let id = parse_task_id(&task_id).map_err(task_error)?;
    let output = state.tasks.results(id).await.map_err(task_error)?;

    let groups = group_by_file(&output.results);
    let files = output
        .files
        .iter()
        .map(|report| {
            let counts = groups
                .iter()
                .find(|group| group.filename == report.filename)
                .map(|group| group.counts())
                .unwrap_or_default();
            FileSummary {
                filename: report.filename.clone(),
                format: report.format,
                lines: report.lines,
                sha256: report.sha256.clone(),
                total_count: counts.total,
                malicious_count: counts.malicious,
                error_count: counts.error,
                non_malicious_count: counts.non_malicious(),
            }
        })
        .collect();

    let counts = Counts::of(&output.results);
    Ok(Json(TaskResultsResponse {
        success: true,
        task_id: id,
        total_count: counts.total,
        malicious_count: counts.malicious,
        error_count: counts.error,
        non_malicious_count: counts.non_malicious(),
        files_processed: output.snapshot.processed_files,
        files,
        results: output.results,
    }))
}

/// Cancel a running task
///
/// The task stops after the current file finishes (files are not
/// interrupted mid-read). Cancelling a finished task changes nothing.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelTaskResponse>, ApiError> {
    let id = parse_task_id(&task_id).map_err(task_error)?;
    let snapshot = state.tasks.cancel(id).await.map_err(task_error)?;

    let message = if snapshot.status.is_terminal() {
        format!(
            "Task is already '{}' and cannot be cancelled",
            snapshot.status
        )
    } else {
        "Cancellation requested; the task stops after the current file".to_string()
    };

    Ok(Json(CancelTaskResponse {
        success: true,
        task_id: id,
        status: snapshot.status,
        message,
    }))
}

// ============================================
// SSE Task Events
// ============================================

fn snapshot_event(name: &str, snapshot: &TaskSnapshot) -> Event {
    Event::default()
        .event(name)
        .data(serde_json::to_string(snapshot).unwrap_or_default())
}

/// Stream task snapshots as server-sent events until the task is terminal
pub async fn task_events(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_task_id(&task_id).map_err(task_error)?;
    let mut updates = state.tasks.subscribe(id).await.map_err(task_error)?;

    let (tx, rx) = mpsc::channel::<Event>(64);

    let current = updates.borrow_and_update().clone();
    let _ = tx.send(snapshot_event("connected", &current)).await;

    if current.status.is_terminal() {
        let _ = tx
            .send(snapshot_event(current.status.as_str(), &current))
            .await;
    } else {
        tokio::spawn(async move {
            forward_task_events(updates, tx).await;
        });
    }

    let stream = TaskEventStream { rx };
    let sse = Sse::new(stream).keep_alive(KeepAlive::default());

    Ok(sse.into_response())
}

/// Background task that forwards every published snapshot as an SSE event
async fn forward_task_events(
    mut updates: watch::Receiver<TaskSnapshot>,
    tx: mpsc::Sender<Event>,
) {
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();

        if tx
            .send(snapshot_event("progress", &snapshot))
            .await
            .is_err()
        {
            return;
        }

        if snapshot.status.is_terminal() {
            let _ = tx
                .send(snapshot_event(snapshot.status.as_str(), &snapshot))
                .await;
            return;
        }
    }
}
