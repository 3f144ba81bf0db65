//! Observer hook for admission failures
//!
//! The gate does not export metrics itself. Instead, callers may attach an
//! [`AdmissionObserver`] which is notified whenever a caller is turned away.
//! Implementations typically bump a "limit reached" counter keyed by the
//! gate's name; see the `metrics` module for a Prometheus-backed one.
//!
//! Observers are invoked synchronously on the rejected caller's task and
//! must not block.

use std::fmt::Debug;

use crate::cancel::CancelReason;

/// Sink for admission failure events
pub trait AdmissionObserver: Send + Sync + Debug {
    /// A caller waited the full admission timeout without getting a permit
    fn limit_reached(&self, gate: &str, capacity: usize);

    /// A caller's cancellation signal fired while waiting for a permit
    fn admission_cancelled(&self, gate: &str, reason: &CancelReason) {
        let _ = (gate, reason);
    }
}
