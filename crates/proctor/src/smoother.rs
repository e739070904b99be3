//! Median smoothing of head-pose samples

use std::collections::VecDeque;

/// Bounded FIFO of recent pose samples (degrees)
#[derive(Debug, Clone)]
pub struct PoseWindow {
    data: VecDeque<f32>,
    capacity: usize,
}

impl PoseWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, evicting the oldest when full
    pub fn push(&mut self, sample: f32) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(sample);
    }

    /// Median of the window, `None` while empty
    pub fn median(&self) -> Option<f32> {
        let samples: Vec<f32> = self.data.iter().copied().collect();
        median(&samples)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Median of a slice; even lengths average the two middle values
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Smoothed yaw/pitch for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothedPose {
    pub yaw: f32,
    pub pitch: f32,
}

/// Push whichever samples are present and return the current medians.
/// An empty window contributes 0.0.
pub fn smooth(
    yaw_window: &mut PoseWindow,
    pitch_window: &mut PoseWindow,
    yaw: Option<f32>,
    pitch: Option<f32>,
) -> SmoothedPose {
    if let Some(y) = yaw {
        yaw_window.push(y);
    }
    if let Some(p) = pitch {
        pitch_window.push(p);
    }

    SmoothedPose {
        yaw: yaw_window.median().unwrap_or(0.0),
        pitch: pitch_window.median().unwrap_or(0.0),
    }
}
