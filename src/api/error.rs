use axum::{Json, extract::rejection::JsonRejection, http::StatusCode};
use serde::Serialize;

use crate::batch::TaskError;

#[derive(Serialize, Clone, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn task_error(err: TaskError) -> ApiError {
    let (status, code) = match &err {
        TaskError::NotFound(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
        TaskError::NotReady { .. } => (StatusCode::CONFLICT, "TASK_NOT_READY"),
        TaskError::NoFiles => (StatusCode::BAD_REQUEST, "NO_FILES"),
        TaskError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        TaskError::CapacityExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_TASKS"),
    };
    (status, Json(ErrorResponse::new(err.to_string(), code)))
}

/// Malformed or mistyped request bodies are reported as 400
pub fn invalid_body(rejection: JsonRejection) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(
            ErrorResponse::new("Invalid request body", "INVALID_REQUEST")
                .with_details(rejection.body_text()),
        ),
    )
}
