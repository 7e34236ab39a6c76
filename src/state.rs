//! Last-known-good store for the coordinator.

use crate::fetcher::{CheckResult, FetchErrorKind};
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Slot {
    latest: Option<CheckResult>,
    updated_at: Option<Instant>,
    last_update_success: bool,
    last_error: Option<FetchErrorKind>,
    consecutive_failures: u32,
}

/// Thread-safe single-slot state.
///
/// Holds the most recent successful [`CheckResult`], if any. A failed refresh
/// only updates the bookkeeping and never clears the stored result.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    slot: RwLock<Slot>,
}

impl CoordinatorState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest successful result.
    pub fn get(&self) -> Option<CheckResult> {
        self.slot.read().ok()?.latest.clone()
    }

    /// Replace the stored result wholesale.
    pub fn replace(&self, result: CheckResult) {
        if let Ok(mut slot) = self.slot.write() {
            slot.latest = Some(result);
            slot.updated_at = Some(Instant::now());
            slot.last_update_success = true;
            slot.last_error = None;
            slot.consecutive_failures = 0;
        }
    }

    /// Record a failed refresh, keeping the stored result.
    pub fn record_failure(&self, kind: FetchErrorKind) {
        if let Ok(mut slot) = self.slot.write() {
            slot.last_update_success = false;
            slot.last_error = Some(kind);
            slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
        }
    }

    /// Whether the most recent cycle succeeded. False before the first cycle.
    pub fn last_update_success(&self) -> bool {
        self.slot.read().map(|s| s.last_update_success).unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<FetchErrorKind> {
        self.slot.read().ok()?.last_error
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.slot.read().map(|s| s.consecutive_failures).unwrap_or(0)
    }

    /// Time since the last successful refresh.
    pub fn age(&self) -> Option<Duration> {
        self.slot.read().ok()?.updated_at.map(|t| t.elapsed())
    }

    pub fn is_empty(&self) -> bool {
        self.get().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;

    fn result(ip: &str) -> CheckResult {
        let mut object = Map::new();
        object.insert("ip".to_string(), ip.into());
        CheckResult::from_object(object, Utc::now())
    }

    #[test]
    fn test_starts_empty() {
        let state = CoordinatorState::new();
        assert!(state.is_empty());
        assert!(!state.last_update_success());
        assert!(state.last_error().is_none());
        assert!(state.age().is_none());
    }

    #[test]
    fn test_replace() {
        let state = CoordinatorState::new();
        state.replace(result("1.2.3.4"));

        assert_eq!(state.get().unwrap().ip.as_deref(), Some("1.2.3.4"));
        assert!(state.last_update_success());
        assert!(state.age().is_some());

        state.replace(result("5.6.7.8"));
        assert_eq!(state.get().unwrap().ip.as_deref(), Some("5.6.7.8"));
    }

    #[test]
    fn test_failure_keeps_previous_result() {
        let state = CoordinatorState::new();
        state.replace(result("1.2.3.4"));

        state.record_failure(FetchErrorKind::HttpStatus);
        state.record_failure(FetchErrorKind::Timeout);

        assert_eq!(state.get().unwrap().ip.as_deref(), Some("1.2.3.4"));
        assert!(!state.last_update_success());
        assert_eq!(state.last_error(), Some(FetchErrorKind::Timeout));
        assert_eq!(state.consecutive_failures(), 2);
    }

    #[test]
    fn test_success_resets_failures() {
        let state = CoordinatorState::new();
        state.record_failure(FetchErrorKind::Network);
        assert!(state.is_empty());

        state.replace(result("1.2.3.4"));
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.last_error().is_none());
    }
}
