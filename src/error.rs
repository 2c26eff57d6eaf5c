use std::fmt;

use thiserror::Error;

use crate::poller::JobPhase;

/// Reasons user-supplied job parameters are refused before submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The lower or upper price bound was not provided.
    #[error("Both price bounds are required")]
    MissingBound,

    /// A price bound was zero, negative, or not a finite number.
    #[error("Price bounds must be greater than zero")]
    NonPositiveBound,

    /// The lower bound exceeds the upper bound.
    #[error("Minimum price {min} must not exceed maximum price {max}")]
    InvertedRange { min: f64, max: f64 },

    /// The requested record count is not an integer in `1..=max`.
    #[error("Desired count must be an integer between 1 and {max} (got {value})")]
    CountOutOfRange { value: f64, max: u32 },
}

/// Category of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The job service answered with a non-success HTTP status.
    ServerRejected,
    /// The response body was empty or not the expected JSON.
    MalformedResponse,
    /// The request never got a response (connect failure, timeout).
    NetworkUnreachable,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::ServerRejected => "server rejected request",
            TransportErrorKind::MalformedResponse => "malformed response",
            TransportErrorKind::NetworkUnreachable => "job service unreachable",
        };
        f.write_str(s)
    }
}

/// A failed call to the job service.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
    /// HTTP status code, when a response was received.
    pub status: Option<u16>,
}

impl TransportError {
    pub fn rejected(status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::ServerRejected,
            detail: detail.into(),
            status: Some(status),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::MalformedResponse,
            detail: detail.into(),
            status: None,
        }
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::NetworkUnreachable,
            detail: detail.into(),
            status: None,
        }
    }
}

/// Errors returned by [`JobController`](crate::JobController) entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Invalid job parameters: {0}")]
    Validation(#[from] ValidationError),

    /// A job is already submitting or polling.
    #[error("A job is already in flight ({0:?})")]
    JobInFlight(JobPhase),

    #[error("{0}")]
    Transport(#[from] TransportError),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::rejected(400, "scrape already running");
        assert_eq!(
            err.to_string(),
            "server rejected request: scrape already running"
        );
        assert_eq!(err.status, Some(400));

        let err = TransportError::malformed("empty response body");
        assert_eq!(err.kind, TransportErrorKind::MalformedResponse);
        assert_eq!(err.status, None);
    }

    #[test]
    fn test_client_error_from_validation() {
        let err: ClientError = ValidationError::MissingBound.into();
        assert_eq!(
            err.to_string(),
            "Invalid job parameters: Both price bounds are required"
        );
    }
}
