use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, invalid_body};
use crate::classifier::{classify_input, fault_result};
use crate::models::{AttackType, ClassificationResult, ClassificationStatus};

/// Upper bound for one free-standing record
const MAX_RECORD_LENGTH: usize = 64 * 1024;

// ============================================
// Request/Response Types
// ============================================

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    #[serde(deserialize_with = "validate_record_data")]
    pub data: String,
}

fn validate_record_data<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let data = String::deserialize(deserializer)?;
    if data.len() > MAX_RECORD_LENGTH {
        return Err(serde::de::Error::custom(format!(
            "Record exceeds maximum length of {} bytes",
            MAX_RECORD_LENGTH
        )));
    }
    Ok(data)
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub success: bool,
    pub status: ClassificationStatus,
    pub attack_type: Option<AttackType>,
    pub reason: String,
}

impl From<&ClassificationResult> for ClassifyResponse {
    fn from(result: &ClassificationResult) -> Self {
        Self {
            success: !result.is_error(),
            status: result.status(),
            attack_type: result.attack_type(),
            reason: result.reason().to_string(),
        }
    }
}

// ============================================
// Handlers
// ============================================

/// Classify a single record, given either as a delimited row or as a
/// structured object line.
///
/// A record that does not parse is answered with 400 and an Error-status
/// body whose reason names the fault.
pub async fn classify_record(
    body: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(invalid_body)?;

    match classify_input(&req.data) {
        Ok((rule, result)) => {
            tracing::debug!(
                rule = rule.name(),
                status = result.status().as_str(),
                attack_type = result.attack_type().map(|a| a.as_str()),
                "Record classified"
            );
            Ok(Json(ClassifyResponse::from(&result)).into_response())
        }
        Err(fault) => {
            tracing::debug!("Record rejected: {}", fault);
            let result = fault_result(&fault);
            Ok((StatusCode::BAD_REQUEST, Json(ClassifyResponse::from(&result))).into_response())
        }
    }
}
