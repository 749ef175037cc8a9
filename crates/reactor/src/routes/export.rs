//! Signed export submission endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use domain::{ExportFormat, ExportJob};
use serde::{Deserialize, Serialize};
use shared::{query_guard, signature};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;

/// Request body for `POST /export`.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub query: String,
    pub email: String,
    #[serde(default)]
    pub format: Option<ExportFormat>,
}

/// Response body on admission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Admits a signed export request into the worker pool.
///
/// The signature covers the raw body, so the body is verified before any
/// JSON parsing happens.
pub async fn submit_export(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let timestamp = header_str(&headers, "X-Timestamp");
    let provided_signature = header_str(&headers, "X-Signature");

    signature::verify(
        &state.config.api_secret,
        "POST",
        "/export",
        &body,
        timestamp,
        provided_signature,
    )
    .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let request: ExportRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?;

    query_guard::validate_query(&request.query)
        .map_err(|e| ApiError::Unprocessable(e.to_string()))?;
    query_guard::validate_email(&request.email)
        .map_err(|e| ApiError::Unprocessable(e.to_string()))?;

    let job = ExportJob::new(
        request.query,
        request.email,
        request.format.unwrap_or(ExportFormat::Csv),
        state.config.job_timeout(),
    );
    let job_id = job.id.clone();

    if !state.workers.submit(job) {
        return Err(ApiError::QueueFull);
    }

    info!(job_id = %job_id, "export job admitted");
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_with_default_format() {
        let request: ExportRequest =
            serde_json::from_str(r#"{"query":"SELECT 1","email":"a@b.co"}"#).unwrap();
        assert_eq!(request.format, None);
    }

    #[test]
    fn test_request_rejects_unknown_format() {
        let result = serde_json::from_str::<ExportRequest>(
            r#"{"query":"SELECT 1","email":"a@b.co","format":"parquet"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_header_str_missing_is_empty() {
        let headers = HeaderMap::new();
        assert_eq!(header_str(&headers, "X-Timestamp"), "");
    }
}
