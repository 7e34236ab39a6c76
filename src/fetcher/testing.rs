//! In-process check source for unit tests.

use super::{CheckResult, CheckSource, FetchError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Replays queued outcomes, then repeats `fallback`.
pub struct ScriptedSource {
    queue: Mutex<VecDeque<Result<CheckResult, FetchError>>>,
    fallback: Result<CheckResult, FetchError>,
    delay: Duration,
    calls: AtomicUsize,
    probes: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(fallback: Result<CheckResult, FetchError>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then(self, outcome: Result<CheckResult, FetchError>) -> Self {
        self.queue.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<CheckResult, FetchError> {
        let queued = self.queue.lock().unwrap().pop_front();
        let outcome = queued.unwrap_or_else(|| self.fallback.clone());
        // Fresh capture time per call, as a real fetch would stamp it
        outcome.map(|mut r| {
            r.last_checked = Utc::now();
            r
        })
    }
}

#[async_trait]
impl CheckSource for ScriptedSource {
    async fn fetch(&self) -> Result<CheckResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next()
    }

    async fn probe(&self) -> Result<CheckResult, FetchError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.next()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Build a result from a JSON object literal.
pub fn check(value: Value) -> CheckResult {
    let object = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    CheckResult::from_object(object, Utc::now())
}
