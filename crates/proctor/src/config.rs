//! Proctoring configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ProctorError;

/// Upper bound for every time window (one day)
const MAX_WINDOW_SECS: f64 = 86_400.0;

/// Upper bound for pose thresholds
const MAX_ANGLE_DEG: f64 = 360.0;

/// Proctoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    /// Time spent collecting pose samples before the baseline is set (seconds)
    pub calibration_window_secs: f64,

    /// Minimum pose samples required to close calibration
    pub min_calibration_samples: usize,

    /// Median window length for yaw/pitch smoothing (frames)
    pub pose_window: usize,

    /// No-face frames tolerated before a candidate is raised
    pub no_face_tolerance: u32,

    /// Multi-face frames tolerated before a candidate is raised
    pub multi_face_tolerance: u32,

    /// Low-confidence / mesh-missing frames tolerated before a candidate is raised
    pub mesh_fail_tolerance: u32,

    /// Face detection confidence threshold
    pub confidence_threshold: f32,

    /// Yaw deviation from baseline that counts as a head turn (degrees)
    pub yaw_warn_deg: f32,

    /// Pitch deviation from baseline that counts as a head tilt (degrees)
    pub pitch_warn_deg: f32,

    /// Extra margin added on top of both pose thresholds (degrees)
    pub deadzone_deg: f32,

    /// How long a no-face / multi-face condition may persist before it is critical (seconds)
    pub critical_grace_secs: f64,

    /// Consecutive bad frames before the run-length acknowledgement
    pub bad_frame_limit: u32,

    /// Consecutive clean frames that re-arm warnings
    pub reset_stable_frames: u32,

    /// Minimum gap between two identical pose/quality warnings (seconds)
    pub warning_cooldown_secs: f64,

    /// Clean frames required before the baseline starts drifting
    pub stable_drift_frames: u32,

    /// Weight of the current median when the baseline drifts
    pub drift_weight: f32,

    /// Report a violation as critical when a bad-frame run repeats after
    /// the run-length acknowledgement was already given
    pub escalate_persistent_warnings: bool,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            calibration_window_secs: 4.0,
            min_calibration_samples: 5,
            pose_window: 3,
            no_face_tolerance: 1,
            multi_face_tolerance: 4,
            mesh_fail_tolerance: 3,
            confidence_threshold: 0.50,
            yaw_warn_deg: 50.0,
            pitch_warn_deg: 40.0,
            deadzone_deg: 10.0,
            critical_grace_secs: 3.0,
            bad_frame_limit: 6,
            reset_stable_frames: 5,
            warning_cooldown_secs: 2.0,
            stable_drift_frames: 30,
            drift_weight: 0.05,
            escalate_persistent_warnings: false,
        }
    }
}

impl ProctorConfig {
    /// Create strict config (tighter pose limits, shorter grace)
    pub fn strict() -> Self {
        Self {
            yaw_warn_deg: 35.0,
            pitch_warn_deg: 30.0,
            critical_grace_secs: 2.0,
            bad_frame_limit: 4,
            warning_cooldown_secs: 1.0,
            escalate_persistent_warnings: true,
            ..Default::default()
        }
    }

    /// Create lenient config (wider pose limits, longer grace)
    pub fn lenient() -> Self {
        Self {
            yaw_warn_deg: 60.0,
            pitch_warn_deg: 50.0,
            critical_grace_secs: 5.0,
            warning_cooldown_secs: 3.0,
            ..Default::default()
        }
    }

    /// Check value ranges before the config is handed to an engine
    pub fn validate(&self) -> Result<(), ProctorError> {
        for (name, value) in [
            ("calibration_window_secs", self.calibration_window_secs),
            ("critical_grace_secs", self.critical_grace_secs),
            ("warning_cooldown_secs", self.warning_cooldown_secs),
        ] {
            check_range(name, value, 0.0, MAX_WINDOW_SECS)?;
        }
        for (name, value) in [
            ("yaw_warn_deg", self.yaw_warn_deg),
            ("pitch_warn_deg", self.pitch_warn_deg),
            ("deadzone_deg", self.deadzone_deg),
        ] {
            check_range(name, f64::from(value), 0.0, MAX_ANGLE_DEG)?;
        }
        check_range("confidence_threshold", f64::from(self.confidence_threshold), 0.0, 1.0)?;
        check_range("drift_weight", f64::from(self.drift_weight), 0.0, 1.0)?;

        if self.min_calibration_samples == 0 {
            return Err(ProctorError::Config(
                "min_calibration_samples must be greater than 0".into(),
            ));
        }
        if self.pose_window == 0 {
            return Err(ProctorError::Config("pose_window must be greater than 0".into()));
        }
        if self.bad_frame_limit == 0 {
            return Err(ProctorError::Config(
                "bad_frame_limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn calibration_window(&self) -> Duration {
        Duration::from_secs_f64(self.calibration_window_secs)
    }

    pub(crate) fn critical_grace(&self) -> Duration {
        Duration::from_secs_f64(self.critical_grace_secs)
    }

    pub(crate) fn warning_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.warning_cooldown_secs)
    }

    /// Yaw deviation at which a head turn is flagged
    pub fn yaw_limit(&self) -> f32 {
        self.yaw_warn_deg + self.deadzone_deg
    }

    /// Pitch deviation at which a head tilt is flagged
    pub fn pitch_limit(&self) -> f32 {
        self.pitch_warn_deg + self.deadzone_deg
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ProctorError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ProctorError::Config(format!(
            "{} must be within [{}, {}], got {}",
            name, min, max, value
        )))
    }
}
