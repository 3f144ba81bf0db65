//! In-process admission gate (bulkhead) for bounding concurrent work.
//!
//! An [`AdmissionGate`] admits at most `capacity` callers at a time. Callers
//! beyond that wait for a permit, but only up to the gate's admission
//! timeout and only while their [`CancelSignal`] has not fired. Rejected
//! callers get an [`AdmissionError`] and their task never runs; admitted
//! callers get their task's output back untouched.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the layers you need:
//! - `serde`: serde derives for configuration types
//! - `config`: loading [`BulkheadSettings`] from env, TOML and JSON
//! - `metrics`: a Prometheus-backed [`AdmissionObserver`]
//! - `test-utils`: concurrency probes and recording observers
//!
//! The gate itself has no optional parts: permit accounting, cancellation,
//! the observer hook and the [`GateRegistry`] are always available.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod gate;
pub mod observer;
pub mod registry;

#[cfg(feature = "metrics")]
pub mod metrics;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use cancel::{CancelReason, CancelSignal};
pub use config::{parse_duration, BulkheadSettings, GateConfig, GateConfigBuilder, GateOverride};
pub use error::{AdmissionError, ErrorClassification, ErrorSeverity, GateError, GateResult};
pub use gate::{AdmissionGate, AdmissionGateBuilder, GateSnapshot, DEFAULT_GATE_NAME};
#[cfg(feature = "metrics")]
pub use metrics::GateMetrics;
pub use observer::AdmissionObserver;
pub use registry::GateRegistry;
