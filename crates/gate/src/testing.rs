//! Test helpers for code protected by admission gates
//!
//! - [`ConcurrencyProbe`] counts how many probed sections run at once and
//!   remembers the peak, for asserting capacity bounds.
//! - [`RecordingObserver`] collects observer events in memory.
//! - [`wait_for_usage`] polls a gate until its usage reaches a value.

// Allow missing error/panic docs for test utilities - they are designed to be self-explanatory
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancel::CancelReason;
use crate::gate::AdmissionGate;
use crate::observer::AdmissionObserver;

#[derive(Debug, Default)]
struct ProbeCounters {
    running: AtomicUsize,
    peak: AtomicUsize,
    entered: AtomicUsize,
}

/// Tracks running and peak concurrency of probed sections
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    counters: Arc<ProbeCounters>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a section as running until the returned guard is dropped
    pub fn enter(&self) -> ProbeGuard {
        let running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(running, Ordering::SeqCst);
        self.counters.entered.fetch_add(1, Ordering::SeqCst);
        ProbeGuard { counters: Arc::clone(&self.counters) }
    }

    /// Sections running right now
    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Highest number of sections ever running at once
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Total number of sections entered
    pub fn entered(&self) -> usize {
        self.counters.entered.load(Ordering::SeqCst)
    }
}

/// Guard returned by [`ConcurrencyProbe::enter`]
#[derive(Debug)]
pub struct ProbeGuard {
    counters: Arc<ProbeCounters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Event captured by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    LimitReached { gate: String, capacity: usize },
    Cancelled { gate: String, reason: CancelReason },
}

/// Observer that stores every event it receives
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far, in order
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Number of limit-reached events for `gate`
    pub fn limit_reached_count(&self, gate: &str) -> usize {
        self.count(|event| matches!(event, ObservedEvent::LimitReached { gate: g, .. } if g == gate))
    }

    /// Number of cancellation events for `gate`
    pub fn cancelled_count(&self, gate: &str) -> usize {
        self.count(|event| matches!(event, ObservedEvent::Cancelled { gate: g, .. } if g == gate))
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    fn count(&self, predicate: impl Fn(&ObservedEvent) -> bool) -> usize {
        self.events.lock().map(|events| events.iter().filter(|e| predicate(e)).count()).unwrap_or(0)
    }

    fn push(&self, event: ObservedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl AdmissionObserver for RecordingObserver {
    fn limit_reached(&self, gate: &str, capacity: usize) {
        self.push(ObservedEvent::LimitReached { gate: gate.to_string(), capacity });
    }

    fn admission_cancelled(&self, gate: &str, reason: &CancelReason) {
        self.push(ObservedEvent::Cancelled { gate: gate.to_string(), reason: reason.clone() });
    }
}

/// Poll `gate` until its usage equals `expected` or `timeout` elapses
///
/// Returns whether the expected usage was observed.
pub async fn wait_for_usage(gate: &AdmissionGate, expected: usize, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        while gate.usage() != expected {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .is_ok()
}
