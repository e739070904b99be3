//! Violation classification
//!
//! Turns one frame's signals into at most one violation candidate while
//! keeping the per-condition run counters current. Whether a candidate
//! ends up as a warning or a critical verdict is decided by
//! [`crate::escalation`].

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::ProctorConfig;
use crate::signals::FrameSignals;
use crate::smoother::{smooth, SmoothedPose};
use crate::state::SessionState;

/// Violation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Nobody in front of the camera
    NoFace,
    /// Someone else in frame
    MultipleFaces,
    /// Face found but the detector is unsure
    LowConfidence,
    /// Face found but landmarks could not be fitted
    MeshMissing,
    /// Yaw too far from baseline
    HeadTurned,
    /// Pitch too far from baseline
    HeadTilted,
}

impl ViolationKind {
    /// User-facing text
    pub fn label(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No face visible",
            ViolationKind::MultipleFaces => "Multiple faces detected",
            ViolationKind::LowConfidence => "Detection low confidence",
            ViolationKind::MeshMissing => "Face landmarks missing",
            ViolationKind::HeadTurned => "Head turned",
            ViolationKind::HeadTilted => "Head tilted",
        }
    }

    /// Presence violations are the only kinds that can become critical on
    /// their own (after the grace period)
    pub fn is_presence(&self) -> bool {
        matches!(self, ViolationKind::NoFace | ViolationKind::MultipleFaces)
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifier output for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assessment {
    /// Violation candidate, if any
    pub candidate: Option<ViolationKind>,

    /// Smoothed pose, when this frame reached the pose branch
    pub pose: Option<SmoothedPose>,

    /// This frame closed calibration
    pub calibrated: bool,
}

/// Classify one frame and update the run counters in `state`.
///
/// Presence checks are exclusive of quality and pose checks. Pose is only
/// evaluated against a ready baseline; calibration frames never produce a
/// pose candidate.
pub fn classify(
    state: &mut SessionState,
    signals: &FrameSignals,
    now: Instant,
    config: &ProctorConfig,
) -> Assessment {
    let mut assessment = Assessment::default();

    if signals.face_count == 0 {
        state.no_face_frames += 1;
        state.multi_face_frames = 0;
        reset_quality(state);
        if state.no_face_frames > config.no_face_tolerance {
            assessment.candidate = Some(ViolationKind::NoFace);
        }
        return assessment;
    }

    if signals.face_count > 1 {
        state.multi_face_frames += 1;
        state.no_face_frames = 0;
        reset_quality(state);
        if state.multi_face_frames > config.multi_face_tolerance {
            assessment.candidate = Some(ViolationKind::MultipleFaces);
        }
        return assessment;
    }

    // Exactly one face: presence restored
    state.no_face_frames = 0;
    state.multi_face_frames = 0;
    state.last_critical_at = None;

    let low_confidence = signals
        .detection_confidence
        .map_or(false, |c| c < config.confidence_threshold);

    if low_confidence {
        state.low_conf_frames += 1;
        if state.low_conf_frames > config.mesh_fail_tolerance {
            assessment.candidate = Some(ViolationKind::LowConfidence);
        }
        return assessment;
    }
    state.low_conf_frames = 0;

    if !signals.mesh_available {
        state.mesh_fail_frames += 1;
        if state.mesh_fail_frames > config.mesh_fail_tolerance {
            assessment.candidate = Some(ViolationKind::MeshMissing);
        }
        return assessment;
    }
    state.mesh_fail_frames = 0;

    let (yaw, pitch) = (signals.yaw(), signals.pitch());
    if yaw.is_none() && pitch.is_none() {
        // Pose solve failed on an otherwise good frame
        return assessment;
    }

    let pose = smooth(&mut state.yaw_window, &mut state.pitch_window, yaw, pitch);
    assessment.pose = Some(pose);

    if !state.calibration.is_ready() {
        if state.calibration.collect(pose, now, config).is_some() {
            state.clear_pose();
            assessment.calibrated = true;
        }
        return assessment;
    }

    if let Some(dev) = state.calibration.deviation(pose) {
        if dev.yaw >= config.yaw_limit() {
            assessment.candidate = Some(ViolationKind::HeadTurned);
        } else if dev.pitch >= config.pitch_limit() {
            assessment.candidate = Some(ViolationKind::HeadTilted);
        } else if state.stable_frames > config.stable_drift_frames {
            state.calibration.drift(pose, config.drift_weight);
        }
    }

    assessment
}

fn reset_quality(state: &mut SessionState) {
    state.low_conf_frames = 0;
    state.mesh_fail_frames = 0;
}
