//! Per-session baseline calibration
//!
//! A session starts in [`CalibrationPhase::Calibrating`]. Smoothed pose
//! samples are collected from the first frame that carries a pose. The
//! baseline is fixed once the calibration window has elapsed *and* enough
//! samples were collected; either condition alone is not sufficient.
//! After that the baseline only moves through slow drift adaptation.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ProctorConfig;
use crate::smoother::{median, SmoothedPose};

/// Calibration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationPhase {
    #[default]
    Calibrating,
    Ready,
}

/// Resting head pose of the session (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub yaw: f32,
    pub pitch: f32,
}

/// Absolute distance of a smoothed pose from the baseline (degrees)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    pub yaw: f32,
    pub pitch: f32,
}

/// Calibration progress and resulting baseline
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    started_at: Option<Instant>,
    yaw_samples: Vec<f32>,
    pitch_samples: Vec<f32>,
    baseline: Option<Baseline>,
}

impl Calibration {
    pub fn phase(&self) -> CalibrationPhase {
        if self.baseline.is_some() {
            CalibrationPhase::Ready
        } else {
            CalibrationPhase::Calibrating
        }
    }

    pub fn is_ready(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Samples collected in the current epoch (0 once the baseline is set)
    pub fn sample_count(&self) -> usize {
        self.yaw_samples.len()
    }

    /// Feed one smoothed sample while calibrating.
    ///
    /// Returns the new baseline on the frame that closes calibration.
    /// Calling this once ready is a no-op.
    pub fn collect(
        &mut self,
        pose: SmoothedPose,
        now: Instant,
        config: &ProctorConfig,
    ) -> Option<Baseline> {
        if self.is_ready() {
            return None;
        }

        let started_at = *self.started_at.get_or_insert(now);
        self.yaw_samples.push(pose.yaw);
        self.pitch_samples.push(pose.pitch);

        let elapsed = now.saturating_duration_since(started_at);
        if elapsed < config.calibration_window()
            || self.yaw_samples.len() < config.min_calibration_samples
        {
            return None;
        }

        let baseline = Baseline {
            yaw: median(&self.yaw_samples)?,
            pitch: median(&self.pitch_samples)?,
        };
        info!(
            "Calibration complete after {:.2}s with {} samples: yaw={:.1} pitch={:.1}",
            elapsed.as_secs_f64(),
            self.yaw_samples.len(),
            baseline.yaw,
            baseline.pitch
        );

        self.yaw_samples.clear();
        self.pitch_samples.clear();
        self.baseline = Some(baseline);
        Some(baseline)
    }

    /// Distance of `pose` from the baseline, `None` while calibrating
    pub fn deviation(&self, pose: SmoothedPose) -> Option<Deviation> {
        self.baseline.map(|b| Deviation {
            yaw: (pose.yaw - b.yaw).abs(),
            pitch: (pose.pitch - b.pitch).abs(),
        })
    }

    /// Blend the baseline toward the current pose
    pub fn drift(&mut self, pose: SmoothedPose, weight: f32) {
        if let Some(b) = self.baseline.as_mut() {
            b.yaw = (1.0 - weight) * b.yaw + weight * pose.yaw;
            b.pitch = (1.0 - weight) * b.pitch + weight * pose.pitch;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pose(yaw: f32, pitch: f32) -> SmoothedPose {
        SmoothedPose { yaw, pitch }
    }

    #[test]
    fn test_time_and_samples_required() {
        let config = ProctorConfig::default();
        let mut calib = Calibration::default();
        let t0 = Instant::now();

        // Plenty of samples, not enough time
        for i in 0..20 {
            let now = t0 + Duration::from_millis(i * 100);
            assert!(calib.collect(pose(1.0, 2.0), now, &config).is_none());
        }
        assert_eq!(calib.phase(), CalibrationPhase::Calibrating);

        let baseline = calib
            .collect(pose(1.0, 2.0), t0 + Duration::from_secs(4), &config)
            .unwrap();
        assert_eq!(baseline, Baseline { yaw: 1.0, pitch: 2.0 });
        assert!(calib.is_ready());
        assert_eq!(calib.sample_count(), 0);
    }

    #[test]
    fn test_sparse_samples_keep_calibrating() {
        let config = ProctorConfig::default();
        let mut calib = Calibration::default();
        let t0 = Instant::now();

        // Only 4 samples spread over 6 seconds
        for i in 0..4 {
            let now = t0 + Duration::from_secs(i * 2);
            assert!(calib.collect(pose(0.0, 0.0), now, &config).is_none());
        }
        assert!(!calib.is_ready());

        assert!(calib
            .collect(pose(0.0, 0.0), t0 + Duration::from_secs(7), &config)
            .is_some());
    }

    #[test]
    fn test_baseline_is_median_of_samples() {
        let config = ProctorConfig {
            calibration_window_secs: 0.0,
            min_calibration_samples: 5,
            ..Default::default()
        };
        let mut calib = Calibration::default();
        let now = Instant::now();
        for (y, p) in [(1.0, -1.0), (2.0, -2.0), (90.0, 45.0), (3.0, -3.0)] {
            calib.collect(pose(y, p), now, &config);
        }
        let baseline = calib.collect(pose(4.0, -4.0), now, &config).unwrap();
        assert_eq!(baseline, Baseline { yaw: 3.0, pitch: -2.0 });
    }

    #[test]
    fn test_collect_after_ready_is_noop() {
        let config = ProctorConfig {
            calibration_window_secs: 0.0,
            min_calibration_samples: 1,
            ..Default::default()
        };
        let mut calib = Calibration::default();
        let now = Instant::now();
        assert!(calib.collect(pose(5.0, 5.0), now, &config).is_some());
        assert!(calib.collect(pose(50.0, 50.0), now, &config).is_none());
        assert_eq!(calib.baseline(), Some(Baseline { yaw: 5.0, pitch: 5.0 }));
    }

    #[test]
    fn test_drift_and_deviation() {
        let config = ProctorConfig {
            calibration_window_secs: 0.0,
            min_calibration_samples: 1,
            ..Default::default()
        };
        let mut calib = Calibration::default();
        assert!(calib.deviation(pose(10.0, 10.0)).is_none());

        calib.collect(pose(0.0, 0.0), Instant::now(), &config);
        calib.drift(pose(20.0, -20.0), 0.05);

        let baseline = calib.baseline().unwrap();
        assert!((baseline.yaw - 1.0).abs() < 1e-5);
        assert!((baseline.pitch + 1.0).abs() < 1e-5);

        let dev = calib.deviation(pose(61.0, 1.0)).unwrap();
        assert!((dev.yaw - 60.0).abs() < 1e-4);
        assert!((dev.pitch - 2.0).abs() < 1e-4);
    }
}
