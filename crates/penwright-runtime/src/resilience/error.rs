//! Failure taxonomy for guarded calls.
//!
//! Every failure a guarded call can produce is a [`CallError`]. Its
//! [`ErrorKind`] decides whether the retry executor tries again, and lets
//! callers tell an unhealthy dependency (admission rejection) apart from a
//! dependency that answered with an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::providers::ProviderError;

/// Classification of a call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, 5xx, 429, connection failure
    Transient,

    /// 401/403 or a request the dependency will never accept
    Permanent,

    /// Rejected locally before any attempt (circuit, limiter, bulkhead)
    Admission,

    /// The dependency answered but the payload could not be recovered
    Decode,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Admission => "admission",
            ErrorKind::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// A failure of one guarded call.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("{dependency}: {source}")]
    Provider {
        dependency: String,
        #[source]
        source: ProviderError,
    },

    #[error("{dependency}: call timed out after {after:?}")]
    Timeout { dependency: String, after: Duration },

    #[error("{dependency}: circuit is open")]
    CircuitOpen { dependency: String },

    #[error("{dependency}: rate limit exceeded")]
    RateLimited { dependency: String },

    #[error("{dependency}: bulkhead queue is full ({max_queued} waiting)")]
    QueueFull { dependency: String, max_queued: usize },

    #[error("{dependency}: gave up waiting for a bulkhead slot after {waited:?}")]
    QueueTimeout { dependency: String, waited: Duration },

    #[error("response could not be decoded: {reason}")]
    Decode { reason: String },
}

impl CallError {
    /// Wrap a provider error raised while calling `dependency`.
    pub fn provider(dependency: impl Into<String>, source: ProviderError) -> Self {
        CallError::Provider {
            dependency: dependency.into(),
            source,
        }
    }

    /// A decode failure with the given reason.
    pub fn decode(reason: impl Into<String>) -> Self {
        CallError::Decode {
            reason: reason.into(),
        }
    }

    /// Taxonomy of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::Provider { source, .. } => {
                if source.is_retryable() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            CallError::Timeout { .. } => ErrorKind::Transient,
            CallError::CircuitOpen { .. }
            | CallError::RateLimited { .. }
            | CallError::QueueFull { .. }
            | CallError::QueueTimeout { .. } => ErrorKind::Admission,
            CallError::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Default retry policy: transient and decode failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Decode)
    }

    /// Whether the call was rejected locally without reaching the dependency.
    pub fn is_admission_rejection(&self) -> bool {
        self.kind() == ErrorKind::Admission
    }

    /// HTTP-like status code, when the dependency reported one.
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::Provider { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// A successful value and the attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    /// The produced value
    pub value: T,

    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// The last failure of a retried call and the attempts made.
///
/// `attempts` is 0 when the call was rejected before its first attempt.
#[derive(Error, Debug)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryFailure {
    /// Last failure observed
    #[source]
    pub error: CallError,

    /// Attempts made
    pub attempts: u32,
}

impl RetryFailure {
    /// A rejection that happened before any attempt.
    pub fn rejected(error: CallError) -> Self {
        Self { error, attempts: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_follow_adapter_flag() {
        let server = CallError::provider("openai", ProviderError::from_status(503, "overloaded"));
        assert_eq!(server.kind(), ErrorKind::Transient);
        assert!(server.is_retryable());
        assert_eq!(server.status(), Some(503));

        let auth = CallError::provider("openai", ProviderError::from_status(401, "bad key"));
        assert_eq!(auth.kind(), ErrorKind::Permanent);
        assert!(!auth.is_retryable());
    }

    #[test]
    fn test_admission_rejections_are_not_retryable() {
        let errors = [
            CallError::CircuitOpen { dependency: "x".into() },
            CallError::RateLimited { dependency: "x".into() },
            CallError::QueueFull { dependency: "x".into(), max_queued: 3 },
            CallError::QueueTimeout { dependency: "x".into(), waited: Duration::from_secs(1) },
        ];

        for error in errors {
            assert!(error.is_admission_rejection());
            assert!(!error.is_retryable());
        }
    }

    #[test]
    fn test_timeouts_and_decode_failures_retry() {
        let timeout = CallError::Timeout {
            dependency: "x".into(),
            after: Duration::from_secs(30),
        };
        assert!(timeout.is_retryable());
        assert!(CallError::decode("no content field").is_retryable());
    }

    #[test]
    fn test_retry_failure_message() {
        let failure = RetryFailure {
            error: CallError::decode("empty"),
            attempts: 3,
        };
        assert!(failure.to_string().contains("after 3 attempt(s)"));
        assert_eq!(RetryFailure::rejected(CallError::decode("x")).attempts, 0);
    }
}
