//! Proctoring API Server
//!
//! HTTP surface for the live proctoring signal classifier. Hosts a single
//! shared engine; every route is a thin call into it.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};

use proctor::{ProctorEngine, ProctorError};

pub mod attempts;
pub mod config;
mod routes;

pub use crate::attempts::{AttemptLedger, SessionStatus};
pub use crate::config::ServiceConfig;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration load failed: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Proctor(#[from] ProctorError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics exporter setup failed: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers
pub struct AppState {
    /// Decision engine
    pub engine: ProctorEngine,
    /// Attempt budgets
    pub attempts: AttemptLedger,
    /// Prometheus render handle (absent when no recorder is installed)
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: &ServiceConfig) -> Result<Self, ApiError> {
        Ok(Self {
            engine: ProctorEngine::new(config.proctor.clone())?,
            attempts: AttemptLedger::new(config.sessions.max_attempts),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/sessions/:id/frames", post(routes::sessions::post_frame))
        .route("/api/v1/sessions/:id/cancel", post(routes::sessions::cancel_session))
        .route("/api/v1/sessions/:id", delete(routes::sessions::clear_session))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_sessions: state.engine.session_count(),
    })
}

/// Prometheus scrape handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            String::new(),
        ),
    }
}

/// Initialize logging
pub fn init_logging(config: &crate::config::LoggingConfig) -> Result<(), ApiError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| ApiError::InvalidConfig(format!("unknown log level '{}'", config.level)))?;

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ApiError::Logging(e.to_string()))
}

/// Install the global Prometheus recorder
pub fn install_metrics() -> Result<PrometheusHandle, ApiError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))
}

/// Periodically evict idle sessions and their attempt budgets
pub fn spawn_idle_sweeper(
    state: Arc<AppState>,
    every: Duration,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_idle(&state, Instant::now(), max_idle);
        }
    })
}

/// One sweep over the session store
pub fn sweep_idle(state: &AppState, now: Instant, max_idle: Duration) -> usize {
    let evicted = state.engine.evict_idle(now, max_idle);
    if evicted > 0 {
        metrics::counter!("proctor_sessions_evicted_total").increment(evicted as u64);
        state.attempts.retain(|id| state.engine.has_session(id));
    }
    evicted
}

/// Run the server
pub async fn run_server(config: ServiceConfig) -> Result<(), ApiError> {
    let handle = install_metrics()?;
    let state = Arc::new(AppState::new(&config)?.with_metrics(handle));

    spawn_idle_sweeper(
        Arc::clone(&state),
        Duration::from_secs(config.sessions.sweep_interval_secs),
        Duration::from_secs(config.sessions.session_idle_secs),
    );

    let app = create_router(state);

    info!("Starting API server on {}", config.server.addr);

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use proctor::FrameSignals;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(&ServiceConfig::default()).unwrap())
    }

    async fn send(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn frame_body(signals: &FrameSignals) -> Body {
        Body::from(serde_json::to_vec(signals).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state());
        let (status, json) = send(app, "GET", "/api/v1/health", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let state = test_state();
        let app = create_router(Arc::clone(&state));
        let (status, json) = send(
            app,
            "POST",
            "/api/v1/sessions/s1/frames",
            frame_body(&FrameSignals::face(0.0, 0.0)),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cheating"], false);
        assert_eq!(json["baselineReady"], false);
        assert_eq!(json["attemptsLeft"], 3);
        assert_eq!(json["status"], "in-progress");
        assert!(json["metrics"].is_object());
        assert_eq!(state.engine.session_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_decode_failed() {
        let state = test_state();
        let app = create_router(Arc::clone(&state));
        let (status, json) = send(
            app,
            "POST",
            "/api/v1/sessions/s1/frames",
            Body::from("{\"faceCount\":"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cheating"], false);
        assert_eq!(json["reason"], "decode-failed");
        assert_eq!(state.engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_and_clear() {
        let state = test_state();

        let (status, _) = send(
            create_router(Arc::clone(&state)),
            "POST",
            "/api/v1/sessions/s1/cancel",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, json) = send(
            create_router(Arc::clone(&state)),
            "POST",
            "/api/v1/sessions/s1/frames",
            frame_body(&FrameSignals::face(0.0, 0.0)),
        )
        .await;
        assert_eq!(json["cheating"], true);
        assert_eq!(json["critical"][0], "cancelled");
        assert_eq!(json["status"], "terminated");
        // Sticky cancellation does not spend attempts
        assert_eq!(json["attemptsLeft"], 3);

        let (status, _) = send(
            create_router(Arc::clone(&state)),
            "DELETE",
            "/api/v1/sessions/s1",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!state.engine.has_session("s1"));
    }

    /// Calibrates on one sample and escalates presence violations at once
    fn fast_state() -> Arc<AppState> {
        let config = ServiceConfig {
            proctor: proctor::ProctorConfig {
                calibration_window_secs: 0.0,
                min_calibration_samples: 1,
                critical_grace_secs: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        Arc::new(AppState::new(&config).unwrap())
    }

    async fn post_signals(state: &Arc<AppState>, id: &str, signals: &FrameSignals) -> Value {
        let uri = format!("/api/v1/sessions/{}/frames", id);
        let (status, json) =
            send(create_router(Arc::clone(state)), "POST", &uri, frame_body(signals)).await;
        assert_eq!(status, StatusCode::OK);
        json
    }

    #[tokio::test]
    async fn test_attempts_exhaustion_terminates() {
        let state = fast_state();

        let json = post_signals(&state, "s", &FrameSignals::face(0.0, 0.0)).await;
        assert_eq!(json["baselineReady"], true);

        // Second no-face frame raises the warning, later ones are critical
        for _ in 0..2 {
            let json = post_signals(&state, "s", &FrameSignals::absent()).await;
            assert_eq!(json["cheating"], false);
            assert_eq!(json["attemptsLeft"], 3);
        }

        for expected in [2, 1, 0] {
            let json = post_signals(&state, "s", &FrameSignals::absent()).await;
            assert_eq!(json["cheating"], true);
            assert_eq!(json["critical"][0], "No face visible");
            assert_eq!(json["attemptsLeft"], expected);
        }
        assert!(state.engine.is_cancelled("s"));

        let json = post_signals(&state, "s", &FrameSignals::face(0.0, 0.0)).await;
        assert_eq!(json["critical"][0], "cancelled");
        assert_eq!(json["attemptsLeft"], 0);
        assert_eq!(json["status"], "terminated");
    }

    #[tokio::test]
    async fn test_no_attempts_spent_during_calibration() {
        let state = fast_state();

        // No face ever: calibration never completes
        let mut escalated = false;
        for _ in 0..45 {
            let json = post_signals(&state, "c", &FrameSignals::absent()).await;
            escalated |= json["cheating"] == true;
            assert_eq!(json["baselineReady"], false);
            assert_eq!(json["attemptsLeft"], 3);
            assert_eq!(json["status"], "in-progress");
        }
        assert!(escalated);
        assert!(!state.engine.is_cancelled("c"));
    }

    #[test]
    fn test_sweep_drops_idle_budgets() {
        let state = test_state();
        let t0 = Instant::now();
        state.engine.ingest_frame_at("idle", &FrameSignals::absent(), t0);
        state.attempts.spend("idle");

        let evicted = sweep_idle(&state, t0 + Duration::from_secs(3600), Duration::from_secs(60));
        assert_eq!(evicted, 1);
        assert!(!state.engine.has_session("idle"));
        assert_eq!(state.attempts.remaining("idle"), 3);
    }
}
