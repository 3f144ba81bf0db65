//! Error types for admission control
//!
//! Two families of errors live here:
//!
//! 1. **`AdmissionError`**: returned by [`AdmissionGate::execute`] when a
//!    caller was never admitted. Both variants guarantee that the task was
//!    not invoked.
//! 2. **`GateError`**: construction and configuration failures. These are
//!    fatal misconfigurations and prevent a gate from being created at all.
//!
//! Errors raised by the protected task itself are never represented here;
//! they travel back to the caller untouched.
//!
//! Both families implement [`ErrorClassification`] so callers that layer a
//! retry policy on top of the gate can make uniform decisions.
//!
//! [`AdmissionGate::execute`]: crate::AdmissionGate::execute

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::cancel::CancelReason;

/// Reasons a caller was not admitted through a gate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// No permit became free within the admission timeout
    #[error("Admission timed out after {timeout:?} waiting for a permit")]
    Timeout { timeout: Duration },

    /// The caller's cancellation signal fired before a permit became free
    #[error("Admission cancelled: {reason}")]
    Cancelled { reason: CancelReason },
}

impl AdmissionError {
    /// Whether the failure was caused by capacity exhaustion
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the failure was caused by caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The cancellation reason, if this is a cancellation
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled { reason } => Some(reason),
            Self::Timeout { .. } => None,
        }
    }
}

/// Construction, configuration and registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Capacity must be positive and within the permit pool's limit
    #[error("Invalid capacity {capacity}: must be between 1 and {max}")]
    InvalidCapacity { capacity: i64, max: usize },

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A gate with this name already exists in the registry
    #[error("Gate '{name}' is already registered")]
    AlreadyRegistered { name: String },
}

impl GateError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

/// Result type for gate construction and configuration
pub type GateResult<T> = Result<T, GateError>;

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: a later attempt may be admitted.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for AdmissionError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Cancelled { .. } => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { timeout } => Some(*timeout),
            Self::Cancelled { .. } => None,
        }
    }
}

impl ErrorClassification for GateError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidCapacity { .. } => ErrorSeverity::Critical,
            Self::Config { .. } | Self::AlreadyRegistered { .. } => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
