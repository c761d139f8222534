use super::{AppState, ChatBody, ErrorBody};
use crate::error::PipelineError;
use crate::guardrail::ScanVerdict;
use crate::pipeline::{EventSink, PipelineOutcome, Request};
use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ChatResponse<'a> {
    response: &'a str,
    input_verdict: &'a ScanVerdict,
    output_verdict: &'a ScanVerdict,
}

pub(super) fn error_response(status: StatusCode, error: &PipelineError) -> Response {
    let body = ErrorBody {
        error: error.to_string(),
        verdict: error.verdict(),
    };
    (status, Json(body)).into_response()
}

pub(super) fn bad_request(message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: message.into(),
        verdict: None,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// GET /healthcheck
pub(super) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /chat: run the pipeline to completion and answer once.
///
/// Policy blocks are a normal answer (200 with the verdict); upstream
/// failures map to 502.
pub(super) async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let request = match Request::new(body.message) {
        Ok(request) => request,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.orchestrator.run(&request, &EventSink::null()).await {
        PipelineOutcome::Completed {
            response,
            input_verdict,
            output_verdict,
        } => Json(ChatResponse {
            response: &response,
            input_verdict: &input_verdict,
            output_verdict: &output_verdict,
        })
        .into_response(),
        PipelineOutcome::Failed(error) if error.is_policy_block() => {
            error_response(StatusCode::OK, &error)
        }
        PipelineOutcome::Failed(error) => error_response(StatusCode::BAD_GATEWAY, &error),
        // A null sink never disconnects; axum drops the future instead.
        PipelineOutcome::Cancelled => StatusCode::NO_CONTENT.into_response(),
    }
}
