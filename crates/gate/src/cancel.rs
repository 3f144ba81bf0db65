//! Explicit, inspectable cancellation for admission waits
//!
//! A [`CancelSignal`] is handed to [`AdmissionGate::execute`] by the caller.
//! It wraps a [`CancellationToken`] and remembers *why* it fired, so a
//! cancelled admission can report its reason back to the caller. Signals may
//! carry a deadline; once the deadline passes the signal counts as cancelled
//! with [`CancelReason::DeadlineExceeded`].
//!
//! Signals are cheap to clone; all clones observe the same cancellation.
//! [`CancelSignal::child`] derives a signal that fires whenever its parent
//! does, but can also be cancelled on its own.
//!
//! [`AdmissionGate::execute`]: crate::AdmissionGate::execute

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a cancellation signal fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancelled explicitly by the owner of the signal
    Requested(String),
    /// The signal's deadline passed
    DeadlineExceeded,
    /// The underlying token was cancelled without a recorded reason
    Unspecified,
}

impl CancelReason {
    /// Convenience constructor for an explicit cancellation
    pub fn requested(message: impl Into<String>) -> Self {
        Self::Requested(message.into())
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested(message) => write!(f, "{message}"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Unspecified => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug)]
struct SignalState {
    reason: OnceLock<CancelReason>,
    deadline: Option<Instant>,
    parent: Option<Arc<SignalState>>,
}

impl SignalState {
    fn recorded_reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.reason.get() {
            return Some(reason.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.recorded_reason())
    }
}

/// Cooperative cancellation signal carrying a reason
///
/// # Examples
///
/// ```rust
/// use admission_gate::{CancelReason, CancelSignal};
///
/// let signal = CancelSignal::new();
/// assert!(!signal.is_cancelled());
///
/// signal.cancel(CancelReason::requested("client went away"));
/// assert!(signal.is_cancelled());
/// assert_eq!(signal.reason(), Some(CancelReason::requested("client went away")));
/// ```
#[derive(Debug, Clone)]
pub struct CancelSignal {
    token: CancellationToken,
    state: Arc<SignalState>,
}

impl CancelSignal {
    /// Create a signal that only fires when cancelled explicitly
    pub fn new() -> Self {
        Self::from_parts(CancellationToken::new(), None, None)
    }

    /// Create a signal that fires after `timeout` has elapsed
    ///
    /// A timeout too large to represent yields a signal without a deadline.
    pub fn with_deadline(timeout: Duration) -> Self {
        let deadline = Instant::now().checked_add(timeout);
        Self::from_parts(CancellationToken::new(), deadline, None)
    }

    /// Create a signal that fires at `deadline`
    pub fn with_deadline_at(deadline: Instant) -> Self {
        Self::from_parts(CancellationToken::new(), Some(deadline), None)
    }

    /// Adopt an existing token, e.g. a scheduler's shutdown token
    ///
    /// Cancellations made through the token directly report
    /// [`CancelReason::Unspecified`].
    pub fn from_token(token: CancellationToken) -> Self {
        Self::from_parts(token, None, None)
    }

    fn from_parts(
        token: CancellationToken,
        deadline: Option<Instant>,
        parent: Option<Arc<SignalState>>,
    ) -> Self {
        Self { token, state: Arc::new(SignalState { reason: OnceLock::new(), deadline, parent }) }
    }

    /// Derive a signal that is cancelled whenever this one is
    ///
    /// The child inherits this signal's deadline and reports this signal's
    /// reason when cancelled through it.
    pub fn child(&self) -> Self {
        Self::from_parts(
            self.token.child_token(),
            self.state.deadline,
            Some(Arc::clone(&self.state)),
        )
    }

    /// Derive a child whose deadline is the earlier of the parent's and
    /// `timeout` from now
    pub fn child_with_deadline(&self, timeout: Duration) -> Self {
        let own = Instant::now().checked_add(timeout);
        let deadline = match (self.state.deadline, own) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self::from_parts(self.token.child_token(), deadline, Some(Arc::clone(&self.state)))
    }

    /// Cancel the signal, recording `reason`
    ///
    /// Returns `true` if this call recorded the reason. The first recorded
    /// reason wins; later calls still cancel but keep the original reason.
    /// A deadline that has already passed counts as recorded first, even if
    /// nobody observed it.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.deadline_passed() {
            let _ = self.state.reason.set(CancelReason::DeadlineExceeded);
        }
        let recorded = self.state.reason.set(reason).is_ok();
        self.token.cancel();
        recorded
    }

    /// Whether the signal has fired, either explicitly or by deadline
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    /// The deadline of this signal, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }

    /// Why the signal fired, or `None` while it has not
    pub fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.state.recorded_reason() {
            return Some(reason);
        }
        if self.deadline_passed() {
            return Some(CancelReason::DeadlineExceeded);
        }
        self.token.is_cancelled().then_some(CancelReason::Unspecified)
    }

    /// Wait until the signal fires and return the reason
    ///
    /// Cancel safe. Reaching the deadline cancels the underlying token so
    /// that children and other waiters observe it too.
    pub async fn cancelled(&self) -> CancelReason {
        match self.state.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {
                        self.cancel(CancelReason::DeadlineExceeded);
                    }
                }
            }
            None => self.token.cancelled().await,
        }
        self.reason().unwrap_or(CancelReason::Unspecified)
    }

    /// The underlying token, for interop with token-based APIs
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn deadline_passed(&self) -> bool {
        self.state.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
