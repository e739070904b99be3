//! Verdict response and diagnostic metrics

use serde::{Deserialize, Serialize};

use crate::escalation::Decision;
use crate::signals::FrameSignals;
use crate::state::SessionState;

/// Reason reported when a frame payload could not be decoded
pub const DECODE_FAILED: &str = "decode-failed";

/// Diagnostic snapshot of the session. Reported only, never used for decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictMetrics {
    pub faces: Option<u32>,
    pub det_conf: Option<f32>,
    pub yaw_raw: Option<f32>,
    pub pitch_raw: Option<f32>,
    pub yaw_med: Option<f32>,
    pub pitch_med: Option<f32>,
    pub no_face_frames: u32,
    pub multi_face_frames: u32,
    pub low_conf_frames: u32,
    pub mesh_fail_frames: u32,
    pub bad_frames: u32,
    pub stable_frames: u32,
    pub baseline_ready: bool,
    pub yaw_baseline: Option<f32>,
    pub pitch_baseline: Option<f32>,
    pub calibration_samples: usize,
}

impl VerdictMetrics {
    /// Snapshot the session, optionally with the frame that produced it
    pub fn capture(state: &SessionState, signals: Option<&FrameSignals>) -> Self {
        let baseline = state.calibration.baseline();
        Self {
            faces: signals.map(|s| s.face_count),
            det_conf: signals.and_then(|s| s.detection_confidence),
            yaw_raw: signals.and_then(FrameSignals::yaw),
            pitch_raw: signals.and_then(FrameSignals::pitch),
            yaw_med: state.yaw_window.median(),
            pitch_med: state.pitch_window.median(),
            no_face_frames: state.no_face_frames,
            multi_face_frames: state.multi_face_frames,
            low_conf_frames: state.low_conf_frames,
            mesh_fail_frames: state.mesh_fail_frames,
            bad_frames: state.bad_frames,
            stable_frames: state.stable_frames,
            baseline_ready: baseline.is_some(),
            yaw_baseline: baseline.map(|b| b.yaw),
            pitch_baseline: baseline.map(|b| b.pitch),
            calibration_samples: state.calibration.sample_count(),
        }
    }
}

/// Per-frame verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictResponse {
    /// Whether the session is currently considered cheating
    pub cheating: bool,

    /// Human-readable summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Critical reasons (cheating-positive)
    pub critical: Vec<String>,

    /// Warning reasons
    pub warnings: Vec<String>,

    /// Diagnostic metrics
    pub metrics: VerdictMetrics,

    /// Whether the session baseline has been calibrated
    pub baseline_ready: bool,
}

impl VerdictResponse {
    /// Build the response for a decided frame
    pub fn assemble(decision: Decision, metrics: VerdictMetrics) -> Self {
        let reason = summarize(&decision.critical, &decision.warnings);
        Self {
            cheating: decision.cheating,
            reason,
            critical: decision.critical,
            warnings: decision.warnings,
            baseline_ready: metrics.baseline_ready,
            metrics,
        }
    }

    /// Non-cheating diagnostic result for an undecodable frame
    pub fn decode_failed(metrics: VerdictMetrics) -> Self {
        Self {
            cheating: false,
            reason: Some(DECODE_FAILED.to_string()),
            critical: Vec::new(),
            warnings: Vec::new(),
            baseline_ready: metrics.baseline_ready,
            metrics,
        }
    }

    /// Check if anything should be shown to the candidate
    pub fn has_reasons(&self) -> bool {
        !self.critical.is_empty() || !self.warnings.is_empty()
    }
}

fn summarize(critical: &[String], warnings: &[String]) -> Option<String> {
    if !critical.is_empty() {
        Some(format!("❌ {}", critical.join(" | ")))
    } else if !warnings.is_empty() {
        Some(format!("⚠️ {}", warnings.join(" | ")))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_prefers_critical() {
        let decision = Decision {
            cheating: true,
            critical: vec!["No face visible".into()],
            warnings: vec!["Head turned".into()],
        };
        let verdict = VerdictResponse::assemble(decision, VerdictMetrics::default());
        assert_eq!(verdict.reason.as_deref(), Some("❌ No face visible"));
        assert!(verdict.cheating);
    }

    #[test]
    fn test_reason_joins_warnings() {
        let decision = Decision {
            cheating: false,
            critical: vec![],
            warnings: vec!["Head turned".into(), "Head tilted".into()],
        };
        let verdict = VerdictResponse::assemble(decision, VerdictMetrics::default());
        assert_eq!(verdict.reason.as_deref(), Some("⚠️ Head turned | Head tilted"));
    }

    #[test]
    fn test_clean_frame_has_no_reason() {
        let verdict = VerdictResponse::assemble(Decision::default(), VerdictMetrics::default());
        assert_eq!(verdict.reason, None);
        assert!(!verdict.has_reasons());

        let json = serde_json::to_value(&verdict).unwrap();
        assert!(json.get("reason").is_none());
        assert_eq!(json["baselineReady"], false);
        assert!(json["metrics"].get("noFaceFrames").is_some());
    }

    #[test]
    fn test_decode_failed_is_not_cheating() {
        let verdict = VerdictResponse::decode_failed(VerdictMetrics::default());
        assert!(!verdict.cheating);
        assert_eq!(verdict.reason.as_deref(), Some(DECODE_FAILED));
    }
}
