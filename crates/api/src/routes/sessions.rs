//! Session Routes

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use proctor::{VerdictResponse, CANCELLED_REASON};

use crate::attempts::SessionStatus;
use crate::AppState;

/// Response for the frame endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResponse {
    #[serde(flatten)]
    pub verdict: VerdictResponse,
    pub attempts_left: u32,
    pub status: SessionStatus,
}

/// Classify one frame's signals.
///
/// The raw body goes to the engine so that malformed JSON becomes a
/// `decode-failed` verdict rather than a rejected request.
pub async fn post_frame(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Json<FrameResponse> {
    let started = Instant::now();
    let verdict = state.engine.ingest_payload(&session_id, &body, started);
    metrics::histogram!("proctor_ingest_seconds").record(started.elapsed().as_secs_f64());
    metrics::counter!("proctor_frames_total").increment(1);

    if verdict.reason.as_deref() == Some(proctor::DECODE_FAILED) {
        metrics::counter!("proctor_decode_failures_total").increment(1);
    }

    let already_cancelled = verdict.critical.iter().any(|c| c == CANCELLED_REASON);
    if verdict.cheating && !already_cancelled {
        metrics::counter!("proctor_cheating_verdicts_total").increment(1);
    }

    // No penalty until the baseline is set
    let attempts_left = if verdict.cheating && !already_cancelled && verdict.baseline_ready {
        let left = state.attempts.spend(&session_id);
        if left == 0 {
            info!("Terminating session {}: no attempts left", session_id);
            state.engine.cancel_session(&session_id);
            metrics::counter!("proctor_sessions_cancelled_total").increment(1);
        }
        left
    } else {
        state.attempts.remaining(&session_id)
    };

    let status = if state.engine.is_cancelled(&session_id) {
        SessionStatus::Terminated
    } else {
        SessionStatus::InProgress
    };

    Json(FrameResponse {
        verdict,
        attempts_left,
        status,
    })
}

/// Cancel a session; every later frame is reported as cheating
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if !state.engine.is_cancelled(&session_id) {
        metrics::counter!("proctor_sessions_cancelled_total").increment(1);
    }
    state.engine.cancel_session(&session_id);
    StatusCode::NO_CONTENT
}

/// Clear a session; the next frame starts a new calibration
pub async fn clear_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.engine.clear_session(&session_id);
    state.attempts.reset(&session_id);
    StatusCode::NO_CONTENT
}
