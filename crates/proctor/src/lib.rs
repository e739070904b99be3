//! Live Proctoring Signal Classifier
//!
//! Turns a stream of per-frame face signals into a per-session cheating
//! verdict:
//! - Per-session baseline calibration (time window + sample count)
//! - Median smoothing of head pose
//! - Presence, quality, and head pose violation classification
//! - Grace periods, warning cooldowns, and run-length acknowledgement
//! - Sticky cancellation
//!
//! Face and landmark detection happen upstream; this crate only consumes
//! their output.

pub mod calibration;
pub mod classifier;
pub mod config;
pub mod escalation;
pub mod signals;
pub mod smoother;
pub mod state;
pub mod store;
pub mod verdict;

pub use calibration::{Baseline, CalibrationPhase};
pub use classifier::ViolationKind;
pub use config::ProctorConfig;
pub use escalation::{Decision, CANCELLED_REASON};
pub use signals::FrameSignals;
pub use state::SessionState;
pub use store::SessionStore;
pub use verdict::{VerdictMetrics, VerdictResponse, DECODE_FAILED};

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Proctoring error types
#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Proctoring engine shared by every session of a process
pub struct ProctorEngine {
    config: ProctorConfig,
    sessions: SessionStore,
}

impl ProctorEngine {
    /// Create a new engine with configuration
    pub fn new(config: ProctorConfig) -> Result<Self, ProctorError> {
        config.validate()?;
        Ok(Self {
            sessions: SessionStore::new(config.pose_window),
            config,
        })
    }

    pub fn config(&self) -> &ProctorConfig {
        &self.config
    }

    /// Classify one frame, stamped with the current time
    pub fn ingest_frame(&self, session_id: &str, signals: &FrameSignals) -> VerdictResponse {
        self.ingest_frame_at(session_id, signals, Instant::now())
    }

    /// Classify one frame captured at `now`
    pub fn ingest_frame_at(
        &self,
        session_id: &str,
        signals: &FrameSignals,
        now: Instant,
    ) -> VerdictResponse {
        if let Err(e) = signals.validate() {
            return self.reject(session_id, e);
        }

        self.sessions.with_session(session_id, |state| {
            state.last_seen = Some(now);
            if state.cancelled {
                debug!("[{}] already cancelled", session_id);
                return VerdictResponse::assemble(
                    Decision::cancelled(),
                    VerdictMetrics::capture(state, Some(signals)),
                );
            }

            let assessment = classifier::classify(state, signals, now, &self.config);
            let decision = escalation::escalate(state, assessment.candidate, now, &self.config);
            let verdict =
                VerdictResponse::assemble(decision, VerdictMetrics::capture(state, Some(signals)));

            debug!(
                "[{}] cheating={} critical={:?} warnings={:?} faces={} baseline_ready={}",
                session_id,
                verdict.cheating,
                verdict.critical,
                verdict.warnings,
                signals.face_count,
                verdict.baseline_ready
            );
            verdict
        })
    }

    /// Decode a JSON frame payload and classify it.
    ///
    /// An undecodable payload yields a non-cheating `decode-failed` verdict
    /// and leaves the session untouched.
    pub fn ingest_payload(&self, session_id: &str, payload: &[u8], now: Instant) -> VerdictResponse {
        match FrameSignals::decode(payload) {
            Ok(signals) => self.ingest_frame_at(session_id, &signals, now),
            Err(e) => self.reject(session_id, e),
        }
    }

    /// Make every future verdict for the session cheating
    pub fn cancel_session(&self, session_id: &str) {
        self.sessions.cancel(session_id);
    }

    /// Forget the session; the next frame starts calibration again
    pub fn clear_session(&self, session_id: &str) {
        self.sessions.clear(session_id);
    }

    /// Drop sessions idle for longer than `max_idle`; cancelled sessions stay
    /// until cleared
    pub fn evict_idle(&self, now: Instant, max_idle: Duration) -> usize {
        self.sessions.evict_idle(now, max_idle)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains(session_id)
    }

    /// Whether the session exists and is cancelled
    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.sessions
            .peek(session_id, |state| state.cancelled)
            .unwrap_or(false)
    }

    fn reject(&self, session_id: &str, error: ProctorError) -> VerdictResponse {
        let snapshot = self.sessions.peek(session_id, |state| {
            (state.cancelled, VerdictMetrics::capture(state, None))
        });

        match snapshot {
            Some((true, metrics)) => VerdictResponse::assemble(Decision::cancelled(), metrics),
            Some((false, metrics)) => {
                warn!("[{}] {}", session_id, error);
                VerdictResponse::decode_failed(metrics)
            }
            None => {
                warn!("[{}] {}", session_id, error);
                VerdictResponse::decode_failed(VerdictMetrics::default())
            }
        }
    }
}

impl Default for ProctorEngine {
    fn default() -> Self {
        Self {
            config: ProctorConfig::default(),
            sessions: SessionStore::default(),
        }
    }
}
