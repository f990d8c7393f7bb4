use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use proofgate_exec::{AnalyzeError, RunError, ToolSpec};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced to HTTP clients. Every variant renders as JSON with
/// `success: false`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("source size {size} exceeds limit of {limit} bytes")]
    SourceTooLarge { size: usize, limit: usize },
    #[error("{0}")]
    BodyTooLarge(String),
    #[error("{0}")]
    NotReady(String),
    #[error("server busy: too many concurrent analyses")]
    Busy,
    #[error("{0}")]
    ToolMissing(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::SourceTooLarge { .. } | ApiError::BodyTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::NotReady(_) | ApiError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::ToolMissing(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable status used by the automation endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::SourceTooLarge { .. } | ApiError::BodyTooLarge(_) => "payload_too_large",
            ApiError::NotReady(_) => "not_ready",
            ApiError::Busy => "busy",
            ApiError::ToolMissing(_) => "tool_unavailable",
            ApiError::Timeout(_) => "timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// Extractor rejections keep the body-limit status; everything else is bad input.
    pub fn from_rejection(status: StatusCode, text: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::BodyTooLarge(text)
        } else {
            ApiError::InvalidInput(text)
        }
    }

    pub fn from_analysis(tool: &ToolSpec, err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::EmptySource => ApiError::InvalidInput(err.to_string()),
            AnalyzeError::Scratch(err) => ApiError::Internal(err.to_string()),
            AnalyzeError::Run(RunError::ExecutableNotFound { .. }) => ApiError::ToolMissing(format!(
                "{name} not found. Please ensure {name} is installed and in PATH.",
                name = tool.name
            )),
            AnalyzeError::Run(RunError::Timeout { timeout, .. }) => ApiError::Timeout(format!(
                "Analysis timed out after {} seconds",
                timeout.as_secs()
            )),
            AnalyzeError::Run(err @ RunError::Io { .. }) => ApiError::Internal(err.to_string()),
        }
    }

    /// Body shape of `/n8n/compile`: `status` and `message` instead of `error`.
    pub fn into_compile_response(self) -> Response {
        let body = json!({
            "success": false,
            "status": self.kind(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"success": false, "error": self.to_string()});
        (self.status_code(), Json(body)).into_response()
    }
}
