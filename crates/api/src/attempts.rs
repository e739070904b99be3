//! Attempt budget per proctoring session
//!
//! Every critical verdict issued after calibration spends one attempt. A
//! session with no attempts left is terminated.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// Session status reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    InProgress,
    Terminated,
}

/// Remaining attempts by session id
pub struct AttemptLedger {
    max_attempts: u32,
    remaining: Mutex<HashMap<String, u32>>,
}

impl AttemptLedger {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            remaining: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts left for the session
    pub fn remaining(&self, id: &str) -> u32 {
        self.lock().get(id).copied().unwrap_or(self.max_attempts)
    }

    /// Spend one attempt and return what is left
    pub fn spend(&self, id: &str) -> u32 {
        let mut remaining = self.lock();
        let left = remaining.entry(id.to_string()).or_insert(self.max_attempts);
        *left = left.saturating_sub(1);

        if *left == 0 {
            warn!("Session {} exhausted its attempts", id);
        } else {
            info!("Session {} spent an attempt, {} left", id, left);
        }
        *left
    }

    /// Restore the full budget
    pub fn reset(&self, id: &str) {
        self.lock().remove(id);
    }

    /// Drop budgets of sessions that no longer exist
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.lock().retain(|id, _| keep(id));
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
