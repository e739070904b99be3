//! Escalation engine
//!
//! Decides, frame by frame, whether a violation candidate is shown as a
//! warning, suppressed, or escalated to a critical (cheating) verdict.
//!
//! - Presence violations (no face, multiple faces) start as warnings and
//!   become critical once they persist past the grace period.
//! - Quality and pose violations are warnings, debounced by a cooldown.
//! - A long run of bad frames raises one extra acknowledgement per run.
//! - A cancelled session is cheating on every frame.

use std::time::Instant;

use tracing::{debug, warn};

use crate::classifier::ViolationKind;
use crate::config::ProctorConfig;
use crate::state::SessionState;

/// Critical reason reported for cancelled sessions
pub const CANCELLED_REASON: &str = "cancelled";

/// Escalation result for one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub cheating: bool,
    pub critical: Vec<String>,
    pub warnings: Vec<String>,
}

impl Decision {
    /// Sticky verdict of a cancelled session
    pub fn cancelled() -> Self {
        Self {
            cheating: true,
            critical: vec![CANCELLED_REASON.to_string()],
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, kind: ViolationKind) {
        self.warnings.push(kind.label().to_string());
    }

    fn critical(&mut self, kind: ViolationKind) {
        self.cheating = true;
        self.critical.push(kind.label().to_string());
    }

    fn warns(&self, kind: ViolationKind) -> bool {
        self.warnings.iter().any(|w| w == kind.label())
    }
}

/// Apply one frame's candidate to the session and decide the verdict
pub fn escalate(
    state: &mut SessionState,
    candidate: Option<ViolationKind>,
    now: Instant,
    config: &ProctorConfig,
) -> Decision {
    if state.cancelled {
        return Decision::cancelled();
    }

    let Some(kind) = candidate else {
        state.bad_frames = 0;
        state.stable_frames += 1;
        if state.stable_frames >= config.reset_stable_frames {
            state.warning_given = false;
            state.last_warning = None;
        }
        return Decision::default();
    };

    state.bad_frames += 1;
    state.stable_frames = 0;

    let mut decision = Decision::default();

    if kind.is_presence() {
        match state.last_critical_at {
            None => {
                state.last_critical_at = Some(now);
                decision.warn(kind);
            }
            Some(since) if now.saturating_duration_since(since) >= config.critical_grace() => {
                warn!(
                    "{} persisted {:.1}s past grace period",
                    kind,
                    now.saturating_duration_since(since).as_secs_f64()
                );
                decision.critical(kind);
            }
            Some(_) => decision.warn(kind),
        }
    } else {
        let in_cooldown = state.last_warning == Some(kind)
            && state
                .last_warning_at
                .map_or(false, |at| now.saturating_duration_since(at) < config.warning_cooldown());

        if in_cooldown {
            debug!("Warning suppressed: {} in cooldown", kind);
        } else {
            decision.warn(kind);
            state.last_warning = Some(kind);
            state.last_warning_at = Some(now);
        }
    }

    // Run-length acknowledgement
    if state.bad_frames >= config.bad_frame_limit && state.baseline_ready() {
        if !state.warning_given {
            state.warning_given = true;
            state.bad_frames = 0;
            state.last_warning_at = Some(now);
            if !decision.warns(kind) {
                decision.warn(kind);
            }
        } else if config.escalate_persistent_warnings && !kind.is_presence() {
            warn!("{} persisted after acknowledgement, escalating", kind);
            decision.warnings.retain(|w| w != kind.label());
            decision.critical(kind);
        }
    }

    decision
}
