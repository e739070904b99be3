//! Per-session proctoring state

use std::time::Instant;

use crate::calibration::Calibration;
use crate::classifier::ViolationKind;
use crate::smoother::PoseWindow;

/// Session state (tracked over the lifetime of one proctoring stream)
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Sticky terminal flag, only undone by clearing the session
    pub cancelled: bool,

    /// Consecutive frames without a face
    pub no_face_frames: u32,

    /// Consecutive frames with more than one face
    pub multi_face_frames: u32,

    /// Consecutive frames below the detection confidence threshold
    pub low_conf_frames: u32,

    /// Consecutive frames where the landmark mesh was unavailable
    pub mesh_fail_frames: u32,

    /// Consecutive frames with a violation candidate
    pub bad_frames: u32,

    /// Consecutive frames without a violation candidate
    pub stable_frames: u32,

    /// Recent yaw samples
    pub yaw_window: PoseWindow,

    /// Recent pitch samples
    pub pitch_window: PoseWindow,

    /// Baseline pose and calibration progress
    pub calibration: Calibration,

    /// Run-length acknowledgement already raised for the current bad run
    pub warning_given: bool,

    /// Last quality/pose warning that was emitted
    pub last_warning: Option<ViolationKind>,

    /// When `last_warning` (or a run-length acknowledgement) was emitted
    pub last_warning_at: Option<Instant>,

    /// First-seen time of the current presence violation
    pub last_critical_at: Option<Instant>,

    /// Time of the most recent frame
    pub last_seen: Option<Instant>,
}

impl SessionState {
    pub fn new(pose_window: usize) -> Self {
        Self {
            cancelled: false,
            no_face_frames: 0,
            multi_face_frames: 0,
            low_conf_frames: 0,
            mesh_fail_frames: 0,
            bad_frames: 0,
            stable_frames: 0,
            yaw_window: PoseWindow::new(pose_window),
            pitch_window: PoseWindow::new(pose_window),
            calibration: Calibration::default(),
            warning_given: false,
            last_warning: None,
            last_warning_at: None,
            last_critical_at: None,
            last_seen: None,
        }
    }

    pub fn baseline_ready(&self) -> bool {
        self.calibration.is_ready()
    }

    /// Clear the pose windows
    pub fn clear_pose(&mut self) {
        self.yaw_window.clear();
        self.pitch_window.clear();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(3)
    }
}
