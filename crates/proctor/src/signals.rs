//! Per-frame signals produced by the face/landmark detector

use serde::{Deserialize, Serialize};

use crate::ProctorError;

/// Signals extracted from one video frame.
///
/// `face_count` is authoritative. Pose fields and `mesh_available` only
/// carry meaning when exactly one face was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSignals {
    /// Number of faces the detector found
    pub face_count: u32,

    /// Score of the primary detection (0-1)
    #[serde(default)]
    pub detection_confidence: Option<f32>,

    /// Head yaw (left-right rotation) in degrees
    #[serde(default)]
    pub head_yaw_deg: Option<f32>,

    /// Head pitch (up-down tilt) in degrees
    #[serde(default)]
    pub head_pitch_deg: Option<f32>,

    /// Whether landmark mesh fitting succeeded
    #[serde(default)]
    pub mesh_available: bool,
}

impl FrameSignals {
    /// A single, confidently detected face with the given pose
    pub fn face(yaw: f32, pitch: f32) -> Self {
        Self {
            face_count: 1,
            detection_confidence: Some(0.95),
            head_yaw_deg: Some(yaw),
            head_pitch_deg: Some(pitch),
            mesh_available: true,
        }
    }

    /// No face in frame
    pub fn absent() -> Self {
        Self::default()
    }

    /// More than one face in frame
    pub fn crowd(face_count: u32) -> Self {
        Self {
            face_count,
            detection_confidence: Some(0.9),
            ..Default::default()
        }
    }

    /// Decode signals from a JSON payload
    pub fn decode(payload: &[u8]) -> Result<Self, ProctorError> {
        let signals: Self =
            serde_json::from_slice(payload).map_err(|e| ProctorError::Decode(e.to_string()))?;
        signals.validate()?;
        Ok(signals)
    }

    /// Reject values no detector can legitimately produce
    pub fn validate(&self) -> Result<(), ProctorError> {
        if let Some(conf) = self.detection_confidence {
            if !conf.is_finite() || !(0.0..=1.0).contains(&conf) {
                return Err(ProctorError::InvalidSignal(format!(
                    "detection confidence {} outside [0, 1]",
                    conf
                )));
            }
        }
        Ok(())
    }

    /// Yaw if the pose solve produced a usable number
    pub fn yaw(&self) -> Option<f32> {
        self.head_yaw_deg.filter(|v| v.is_finite())
    }

    /// Pitch if the pose solve produced a usable number
    pub fn pitch(&self) -> Option<f32> {
        self.head_pitch_deg.filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_camel_case() {
        let payload = br#"{"faceCount":1,"detectionConfidence":0.8,"headYawDeg":12.5,"headPitchDeg":-3.0,"meshAvailable":true}"#;
        let signals = FrameSignals::decode(payload).unwrap();
        assert_eq!(signals.face_count, 1);
        assert_eq!(signals.detection_confidence, Some(0.8));
        assert_eq!(signals.yaw(), Some(12.5));
        assert!(signals.mesh_available);
    }

    #[test]
    fn test_decode_optional_fields() {
        let signals = FrameSignals::decode(br#"{"faceCount":0}"#).unwrap();
        assert_eq!(signals, FrameSignals::absent());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            FrameSignals::decode(b"\xff\xd8\xff not json"),
            Err(ProctorError::Decode(_))
        ));
        assert!(matches!(
            FrameSignals::decode(br#"{"faceCount":-1}"#),
            Err(ProctorError::Decode(_))
        ));
    }

    #[test]
    fn test_out_of_range_confidence() {
        assert!(matches!(
            FrameSignals::decode(br#"{"faceCount":1,"detectionConfidence":1.7}"#),
            Err(ProctorError::InvalidSignal(_))
        ));
    }

    #[test]
    fn test_non_finite_pose_is_absent() {
        let signals = FrameSignals {
            head_yaw_deg: Some(f32::NAN),
            head_pitch_deg: Some(f32::INFINITY),
            ..FrameSignals::face(0.0, 0.0)
        };
        assert_eq!(signals.yaw(), None);
        assert_eq!(signals.pitch(), None);
    }
}
