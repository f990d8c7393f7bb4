use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Form, Json};
use proofgate_exec::{analyze, Analysis, ClassificationFlags, Mode, Status, ToolSpec, UnknownMode};
use proofgate_install::steps::version_line;
use proofgate_install::{InstallSnapshot, Phase, STATUS_LOG_TAIL};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct CompileResponse {
    pub success: bool,
    pub status: Status,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub analysis: ClassificationFlags,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tool_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    pub installer: Phase,
}

fn validate_source(source: &str, config: &ServerConfig) -> Result<(), ApiError> {
    if source.is_empty() {
        return Err(ApiError::InvalidInput("No code provided".into()));
    }
    if source.len() > config.max_source_bytes {
        return Err(ApiError::SourceTooLarge {
            size: source.len(),
            limit: config.max_source_bytes,
        });
    }
    Ok(())
}

fn json_body(
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<AnalyzeRequest, ApiError> {
    payload
        .map(|Json(request)| request)
        .map_err(|rejection| ApiError::from_rejection(rejection.status(), rejection.body_text()))
}

fn prepare(state: &AppState, request: AnalyzeRequest) -> Result<(String, Mode), ApiError> {
    let code = request.code.unwrap_or_default();
    validate_source(&code, &state.config)?;
    let mode = match request.mode.as_deref().map(str::trim) {
        None | Some("") => Mode::default(),
        Some(raw) => raw
            .parse()
            .map_err(|e: UnknownMode| ApiError::InvalidInput(e.to_string()))?,
    };
    Ok((code, mode))
}

fn require_installed(state: &AppState) -> Result<(), ApiError> {
    match state.install.phase() {
        Phase::Installed => Ok(()),
        Phase::Failed => Err(ApiError::NotReady(
            "Tamarin prover installation failed; see /tamarin-status for details".into(),
        )),
        Phase::Idle | Phase::Installing => Err(ApiError::NotReady(
            "Tamarin prover is still being installed; try again shortly".into(),
        )),
    }
}

async fn run_tool(
    state: &AppState,
    tool: &ToolSpec,
    mode: Mode,
    code: &str,
) -> Result<Analysis, ApiError> {
    let _permit = state
        .run_permits
        .try_acquire()
        .map_err(|_| ApiError::Busy)?;
    analyze(
        state.runner.as_ref(),
        &state.scratch,
        tool,
        &state.classifier,
        mode,
        code,
    )
    .await
    .map_err(|err| {
        warn!(tool = %tool.name, %mode, error = %err, "analysis failed");
        ApiError::from_analysis(tool, err)
    })
}

fn status_message(status: Status, mode: Mode, exit_code: i32) -> String {
    match (status, mode) {
        (Status::Success, Mode::Check) => "Theory is well-formed".into(),
        (Status::Success, Mode::Prove) => {
            "Proof run completed; see the output for per-lemma results".into()
        }
        (Status::ParseError, _) => {
            "Parse error in theory; check the syntax near the reported location".into()
        }
        (Status::WellformednessError, _) => "Theory failed well-formedness checks".into(),
        (Status::Unknown, _) => "Tamarin finished without recognizable diagnostics".into(),
        (Status::Error, _) => format!("Tamarin exited with code {exit_code}"),
    }
}

const TRUNCATION_MARKER: &str = "\n[truncated: output exceeded size limit]";

/// Caps tool output at `limit` bytes, marker included. Returns whether it was cut.
fn truncate_output(text: &mut String, limit: usize) -> bool {
    if text.len() <= limit {
        return false;
    }
    let mut end = limit.saturating_sub(TRUNCATION_MARKER.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str(TRUNCATION_MARKER);
    true
}

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let probe = state
        .runner
        .run(
            state.tamarin.program.as_os_str(),
            &[OsString::from("--version")],
            Duration::from_secs(state.config.health_probe_timeout_secs),
        )
        .await;
    let (tool_available, tool_version) = match probe {
        Ok(output) if output.success() => (true, Some(version_line(&output))),
        Ok(output) => {
            debug!(exit_code = output.exit_code, "health probe exited non-zero");
            (false, None)
        }
        Err(err) => {
            debug!(error = %err, "health probe failed");
            (false, None)
        }
    };
    Json(HealthResponse {
        status: "healthy",
        tool_available,
        tool_version,
        installer: state.install.phase(),
    })
}

pub async fn tamarin_status(State(state): State<Arc<AppState>>) -> Json<InstallSnapshot> {
    Json(state.install.snapshot(STATUS_LOG_TAIL))
}

/// circomspect findings are informational, so any completed run is a success.
pub async fn audit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let (code, mode) = prepare(&state, json_body(payload)?)?;
    let analysis = run_tool(&state, &state.circomspect, mode, &code).await?;
    let mut output = analysis.output.primary_text().to_string();
    let truncated = truncate_output(&mut output, state.config.max_output_bytes);
    Ok(Json(AnalyzeResponse {
        success: true,
        output: Some(output),
        returncode: Some(analysis.output.exit_code),
        status: Some(analysis.classification.status),
        truncated,
        ..AnalyzeResponse::default()
    }))
}

pub async fn tamarin(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let (code, mode) = prepare(&state, json_body(payload)?)?;
    require_installed(&state)?;
    let analysis = run_tool(&state, &state.tamarin, mode, &code).await?;
    let classification = analysis.classification;
    let exit_code = analysis.output.exit_code;
    let mut output = analysis.output.combined();
    let truncated = truncate_output(&mut output, state.config.max_output_bytes);
    Ok(Json(AnalyzeResponse {
        success: classification.success,
        output: Some(output),
        error: (!classification.success)
            .then(|| status_message(classification.status, mode, exit_code)),
        returncode: Some(exit_code),
        mode: Some(mode),
        status: Some(classification.status),
        truncated,
    }))
}

/// Automation variant of `/tamarin`: accepts JSON or form bodies and reports
/// classified failures with HTTP 400.
pub async fn n8n_compile(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match compile(&state, request).await {
        Ok(analysis) => {
            let classification = analysis.classification;
            let code = if classification.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            let message =
                status_message(classification.status, analysis.mode, analysis.output.exit_code);
            let limit = state.config.max_output_bytes;
            let (mut stdout, mut stderr) = (analysis.output.stdout, analysis.output.stderr);
            let stdout_cut = truncate_output(&mut stdout, limit);
            let stderr_cut = truncate_output(&mut stderr, limit);
            let body = CompileResponse {
                success: classification.success,
                status: classification.status,
                returncode: analysis.output.exit_code,
                stdout,
                stderr,
                analysis: classification.flags,
                message,
                truncated: stdout_cut || stderr_cut,
            };
            (code, Json(body)).into_response()
        }
        Err(err) => err.into_compile_response(),
    }
}

async fn compile(state: &Arc<AppState>, request: Request) -> Result<Analysis, ApiError> {
    let payload = read_compile_payload(state, request).await?;
    let (code, mode) = prepare(state, payload)?;
    require_installed(state)?;
    run_tool(state, &state.tamarin, mode, &code).await
}

async fn read_compile_payload(
    state: &Arc<AppState>,
    request: Request,
) -> Result<AnalyzeRequest, ApiError> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        Form::<AnalyzeRequest>::from_request(request, state)
            .await
            .map(|Form(payload)| payload)
            .map_err(|rejection| {
                ApiError::from_rejection(rejection.status(), rejection.body_text())
            })
    } else {
        json_body(Json::<AnalyzeRequest>::from_request(request, state).await)
    }
}
