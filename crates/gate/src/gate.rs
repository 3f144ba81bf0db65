//! Admission gate (bulkhead) for limiting concurrent operations
//!
//! The bulkhead pattern prevents resource exhaustion by limiting the number
//! of concurrent operations against a protected resource. Named after ship
//! bulkheads that contain flooding to specific compartments, a gate isolates
//! an overloaded dependency so its slowness cannot consume every caller.
//!
//! A gate owns a fixed pool of permits. [`AdmissionGate::execute`] waits for
//! a permit (up to the admission timeout, and only while the caller's
//! [`CancelSignal`] has not fired), runs the task while holding it, and
//! releases it on every exit path, including panics and the `execute`
//! future being dropped.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, instrument, warn};

use crate::cancel::{CancelReason, CancelSignal};
use crate::config::GateConfig;
use crate::error::{AdmissionError, GateError, GateResult};
use crate::observer::AdmissionObserver;

/// Name used for gates built without an explicit name
pub const DEFAULT_GATE_NAME: &str = "default";

/// Point-in-time view of a gate for gauge export
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GateSnapshot {
    /// Resource/service identifier of the gate
    pub name: String,
    /// Configured maximum number of concurrent operations
    pub capacity: usize,
    /// Permits held when the snapshot was taken
    pub usage: usize,
}

impl GateSnapshot {
    /// Current utilization as a fraction (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.usage as f64 / self.capacity as f64
    }

    /// Permits that were free when the snapshot was taken
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.usage)
    }

    /// Check if the gate was at capacity
    pub fn is_at_capacity(&self) -> bool {
        self.usage >= self.capacity
    }
}

/// Builder for [`AdmissionGate`]
#[derive(Debug)]
pub struct AdmissionGateBuilder {
    name: String,
    capacity: i64,
    timeout: Duration,
    observer: Option<Arc<dyn AdmissionObserver>>,
}

impl Default for AdmissionGateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGateBuilder {
    pub fn new() -> Self {
        let defaults = GateConfig::default();
        Self {
            name: DEFAULT_GATE_NAME.to_string(),
            capacity: defaults.capacity,
            timeout: defaults.timeout,
            observer: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = i64::try_from(capacity).unwrap_or(i64::MAX);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fail immediately when no permit is free
    pub fn no_wait(mut self) -> Self {
        self.timeout = Duration::ZERO;
        self
    }

    /// Take capacity and timeout from configuration
    pub fn config(mut self, config: &GateConfig) -> Self {
        self.capacity = config.capacity;
        self.timeout = config.timeout;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn AdmissionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> GateResult<AdmissionGate> {
        let capacity = validate_capacity(self.capacity)?;
        debug!(gate = %self.name, capacity, timeout = ?self.timeout, "Created admission gate");

        Ok(AdmissionGate {
            name: Arc::from(self.name),
            capacity,
            timeout: self.timeout,
            permits: Semaphore::new(capacity),
            observer: self.observer,
        })
    }
}

pub(crate) fn validate_capacity(capacity: i64) -> GateResult<usize> {
    usize::try_from(capacity)
        .ok()
        .filter(|permits| (1..=Semaphore::MAX_PERMITS).contains(permits))
        .ok_or(GateError::InvalidCapacity { capacity, max: Semaphore::MAX_PERMITS })
}

/// Bulkhead bounding how many protected operations run at once
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use admission_gate::{AdmissionGate, CancelSignal};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gate = AdmissionGate::new(5, Duration::from_millis(100))?;
/// let cancel = CancelSignal::new();
///
/// let result = gate
///     .execute(&cancel, || async {
///         // Your operation
///         Ok::<_, std::io::Error>("Success")
///     })
///     .await?;
/// assert_eq!(result?, "Success");
/// # Ok(())
/// # }
/// ```
pub struct AdmissionGate {
    name: Arc<str>,
    capacity: usize,
    timeout: Duration,
    permits: Semaphore,
    observer: Option<Arc<dyn AdmissionObserver>>,
}

impl AdmissionGate {
    /// Create a gate admitting at most `capacity` concurrent operations
    ///
    /// A zero `timeout` makes the gate fail immediately when no permit is
    /// free instead of waiting.
    ///
    /// # Errors
    /// Returns [`GateError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize, timeout: Duration) -> GateResult<Self> {
        Self::builder().capacity(capacity).timeout(timeout).build()
    }

    /// Create a named gate from configuration
    ///
    /// # Errors
    /// Returns [`GateError::InvalidCapacity`] if the configured capacity is
    /// zero or negative.
    pub fn from_config(name: impl Into<String>, config: &GateConfig) -> GateResult<Self> {
        Self::builder().name(name).config(config).build()
    }

    /// Create a new gate builder
    pub fn builder() -> AdmissionGateBuilder {
        AdmissionGateBuilder::new()
    }

    /// Resource/service identifier of this gate
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured maximum number of concurrent operations
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum time a caller waits for a permit
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Permits currently held
    ///
    /// Lock-free snapshot that may be stale by the time it returns. Use it
    /// for observability only, never to decide whether to call `execute`.
    pub fn usage(&self) -> usize {
        self.capacity.saturating_sub(self.permits.available_permits())
    }

    /// Permits currently free, with the same caveats as [`Self::usage`]
    pub fn available(&self) -> usize {
        self.capacity - self.usage()
    }

    /// Capture name, capacity and usage for gauge export
    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot { name: self.name.to_string(), capacity: self.capacity, usage: self.usage() }
    }

    /// Run `task` once a permit is available
    ///
    /// Waits for a permit until the admission timeout elapses or `cancel`
    /// fires. Whichever happens first decides the outcome; when several are
    /// ready at once no particular one is favoured. The task's output,
    /// including any error it returns, is passed back unchanged in `Ok`.
    ///
    /// # Errors
    /// - [`AdmissionError::Timeout`] if no permit became free in time
    /// - [`AdmissionError::Cancelled`] if `cancel` fired first
    ///
    /// In both cases `task` is never invoked.
    #[instrument(skip_all, fields(gate = %self.name, capacity = self.capacity))]
    pub async fn execute<F, Fut>(
        &self,
        cancel: &CancelSignal,
        task: F,
    ) -> Result<Fut::Output, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _permit = self.admit(cancel).await?;
        debug!(usage = self.usage(), "Admitted operation");

        Ok(task().await)
        // Permit is released here when dropped, on unwind as well
    }

    /// Run a fallible `task`, folding admission failures into its error type
    ///
    /// # Errors
    /// Returns the task's own error unchanged, or the admission failure
    /// converted through `E: From<AdmissionError>`.
    pub async fn try_execute<F, Fut, T, E>(&self, cancel: &CancelSignal, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AdmissionError>,
    {
        self.execute(cancel, task).await?
    }

    async fn admit(&self, cancel: &CancelSignal) -> Result<SemaphorePermit<'_>, AdmissionError> {
        if self.timeout.is_zero() {
            return match self.permits.try_acquire() {
                Ok(permit) => Ok(permit),
                Err(_) => match cancel.reason() {
                    Some(reason) => Err(self.reject_cancelled(reason)),
                    None => Err(self.reject_limit_reached()),
                },
            };
        }

        tokio::select! {
            // The pool is never closed, so an acquire error cannot outlive the wait
            acquired = self.permits.acquire() => acquired.map_err(|_| self.reject_limit_reached()),
            () = tokio::time::sleep(self.timeout) => Err(self.reject_limit_reached()),
            reason = cancel.cancelled() => Err(self.reject_cancelled(reason)),
        }
    }

    fn reject_limit_reached(&self) -> AdmissionError {
        warn!(timeout = ?self.timeout, "Admission limit reached");
        if let Some(observer) = &self.observer {
            observer.limit_reached(&self.name, self.capacity);
        }
        AdmissionError::Timeout { timeout: self.timeout }
    }

    fn reject_cancelled(&self, reason: CancelReason) -> AdmissionError {
        debug!(%reason, "Admission cancelled while waiting");
        if let Some(observer) = &self.observer {
            observer.admission_cancelled(&self.name, &reason);
        }
        AdmissionError::Cancelled { reason }
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("timeout", &self.timeout)
            .field("usage", &self.usage())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
