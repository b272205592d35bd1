//! Error types used by the flowvisor primitives.
//!
//! This module defines two error enums:
//!
//! - [`FlowError`]: errors returned by operations (acquire, retry, guarded calls, tasks).
//! - [`ConfigError`]: precondition violations reported when a primitive is constructed.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// # Errors produced by primitive operations and user tasks.
///
/// `FlowError` is `Clone` so that one result can be handed to every caller
/// coalesced onto the same in-flight call.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Operation aborted because its cancellation token fired.
    #[error("operation cancelled")]
    Canceled,

    /// Guarded call rejected without touching the dependency.
    #[error("circuit breaker is open; retry in {retry_in:?}")]
    CircuitOpen {
        /// Time left until the breaker admits a trial call.
        retry_in: Duration,
    },

    /// Deadline elapsed before the operation completed.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// User task failed; retrying may succeed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// User task failed in a way that must not be retried.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl FlowError {
    /// Wraps any displayable error as a retryable [`FlowError::Fail`].
    pub fn fail(error: impl Display) -> Self {
        FlowError::Fail {
            error: error.to_string(),
        }
    }

    /// Wraps any displayable error as a non-retryable [`FlowError::Fatal`].
    pub fn fatal(error: impl Display) -> Self {
        FlowError::Fatal {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use flowvisor::FlowError;
    /// use std::time::Duration;
    ///
    /// let err = FlowError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "flow_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FlowError::Canceled => "flow_canceled",
            FlowError::CircuitOpen { .. } => "flow_circuit_open",
            FlowError::Timeout { .. } => "flow_timeout",
            FlowError::Fail { .. } => "flow_failed",
            FlowError::Fatal { .. } => "flow_fatal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            FlowError::Canceled => "context cancelled".to_string(),
            FlowError::CircuitOpen { retry_in } => format!("circuit open: retry in {retry_in:?}"),
            FlowError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            FlowError::Fail { error } => format!("error: {error}"),
            FlowError::Fatal { error } => format!("fatal: {error}"),
        }
    }

    /// Indicates whether backing off and trying again can help.
    ///
    /// Returns `true` for [`FlowError::Fail`], [`FlowError::Timeout`] and
    /// [`FlowError::CircuitOpen`], `false` otherwise.
    ///
    /// # Example
    /// ```
    /// use flowvisor::FlowError;
    ///
    /// assert!(FlowError::fail("boom").is_retryable());
    /// assert!(!FlowError::fatal("nope").is_retryable());
    /// assert!(!FlowError::Canceled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowError::Fail { .. } | FlowError::Timeout { .. } | FlowError::CircuitOpen { .. }
        )
    }

    /// Returns `true` if the error is [`FlowError::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self, FlowError::Canceled)
    }
}

/// # Misuse detected while constructing a primitive.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A constructor argument is outside its valid range.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter.
        name: &'static str,
        /// What the parameter must satisfy.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: &'static str) -> Self {
        ConfigError::InvalidArgument { name, reason }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidArgument { .. } => "config_invalid_argument",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ConfigError::InvalidArgument { name, reason } => format!("{name}: {reason}"),
        }
    }
}

/// Rejects zero for a count-like constructor argument.
pub(crate) fn ensure_nonzero(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::invalid(name, "must be at least 1"))
    } else {
        Ok(value)
    }
}
