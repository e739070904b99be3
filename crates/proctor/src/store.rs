//! Session store
//!
//! Maps session ids to their state. The map lock is only held to look up,
//! insert, or remove a handle; all frame processing happens under the
//! session's own mutex, so sessions never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::state::SessionState;

type SessionHandle = Arc<Mutex<SessionState>>;

/// Owned map of per-session state with per-session serialization
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    pose_window: usize,
}

impl SessionStore {
    /// Create an empty store; new sessions get pose windows of `pose_window`
    pub fn new(pose_window: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pose_window,
        }
    }

    /// Fetch the session handle, creating default state on first reference
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        if let Some(handle) = self.read_map().get(id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.write_map();
        let handle = sessions.entry(id.to_string()).or_insert_with(|| {
            debug!("Creating session state for {}", id);
            Arc::new(Mutex::new(SessionState::new(self.pose_window)))
        });
        Arc::clone(handle)
    }

    /// Run `f` against the session state, serialized with every other
    /// operation on the same id
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let handle = self.get_or_create(id);
        let mut state = lock(&handle);
        f(&mut state)
    }

    /// Read the session without creating it
    pub fn peek<R>(&self, id: &str, f: impl FnOnce(&SessionState) -> R) -> Option<R> {
        let handle = self.read_map().get(id).cloned()?;
        let state = lock(&handle);
        Some(f(&state))
    }

    /// Mark the session cancelled (creates it if needed)
    pub fn cancel(&self, id: &str) {
        self.with_session(id, |state| {
            if !state.cancelled {
                info!("Session {} cancelled", id);
            }
            state.cancelled = true;
        });
    }

    /// Drop the session entirely; the next frame starts a new calibration epoch
    pub fn clear(&self, id: &str) -> bool {
        let removed = self.write_map().remove(id);
        if let Some(handle) = &removed {
            // Wait for an in-flight frame on this session to finish
            drop(lock(handle));
            info!("Session {} cleared", id);
        }
        removed.is_some()
    }

    /// Remove sessions that have not seen a frame for longer than `max_idle`.
    ///
    /// Cancelled sessions are kept so the verdict stays sticky until the
    /// session is cleared. A session busy with a frame is never idle.
    pub fn evict_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let handles: Vec<(String, SessionHandle)> = self
            .read_map()
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();

        let idle: Vec<String> = handles
            .into_iter()
            .filter(|(_, handle)| is_idle(&lock(handle), now, max_idle))
            .map(|(id, _)| id)
            .collect();
        if idle.is_empty() {
            return 0;
        }

        let mut sessions = self.write_map();
        let mut evicted = 0;
        for id in idle {
            // Re-check without blocking: a frame may have landed since the scan
            let still_idle = sessions.get(&id).map_or(false, |handle| match handle.try_lock() {
                Ok(state) => is_idle(&state, now, max_idle),
                Err(TryLockError::Poisoned(e)) => is_idle(&e.into_inner(), now, max_idle),
                Err(TryLockError::WouldBlock) => false,
            });
            if still_idle {
                sessions.remove(&id);
                evicted += 1;
            }
        }
        drop(sessions);

        if evicted > 0 {
            info!("Evicted {} idle sessions", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read_map().contains_key(id)
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(3)
    }
}

fn is_idle(state: &SessionState, now: Instant, max_idle: Duration) -> bool {
    !state.cancelled
        && state
            .last_seen
            .map_or(false, |seen| now.saturating_duration_since(seen) > max_idle)
}

// Session state is plain data and every transition leaves it well-formed,
// so a panic elsewhere never invalidates it.
fn lock(handle: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation() {
        let store = SessionStore::default();
        assert!(store.is_empty());

        store.with_session("a", |s| s.bad_frames = 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek("a", |s| s.bad_frames), Some(2));
        assert_eq!(store.peek("b", |s| s.bad_frames), None);
        assert!(!store.contains("b"));
    }

    #[test]
    fn test_cancel_idempotent_and_creates() {
        let store = SessionStore::default();
        store.cancel("x");
        store.cancel("x");
        assert_eq!(store.peek("x", |s| s.cancelled), Some(true));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_resets_state() {
        let store = SessionStore::default();
        store.cancel("x");
        assert!(store.clear("x"));
        assert!(!store.clear("x"));

        store.with_session("x", |s| assert!(!s.cancelled));
    }

    #[test]
    fn test_evict_idle() {
        let store = SessionStore::default();
        let t0 = Instant::now();
        store.with_session("old", |s| s.last_seen = Some(t0));
        store.with_session("fresh", |s| s.last_seen = Some(t0 + Duration::from_secs(50)));
        store.with_session("never", |_| ());

        let evicted = store.evict_idle(t0 + Duration::from_secs(60), Duration::from_secs(30));
        assert_eq!(evicted, 1);
        assert!(!store.contains("old"));
        assert!(store.contains("fresh"));
        assert!(store.contains("never"));
    }

    #[test]
    fn test_evict_idle_keeps_cancelled() {
        let store = SessionStore::default();
        let t0 = Instant::now();
        store.with_session("gone", |s| s.last_seen = Some(t0));
        store.cancel("gone");

        let evicted = store.evict_idle(t0 + Duration::from_secs(7200), Duration::from_secs(30));
        assert_eq!(evicted, 0);
        assert_eq!(store.peek("gone", |s| s.cancelled), Some(true));
    }

    #[test]
    fn test_sessions_are_independent_across_threads() {
        let store = Arc::new(SessionStore::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("session-{}", t % 4);
                    for _ in 0..1000 {
                        store.with_session(&id, |s| s.bad_frames += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.len(), 4);
        for i in 0..4 {
            assert_eq!(store.peek(&format!("session-{}", i), |s| s.bad_frames), Some(2000));
        }
    }
}
