//! Error types for provider API calls.
//!
//! Every failing HTTP status is classified into a closed set of variants so
//! callers can tell authentication problems from validation failures or
//! provider outages. The raw response body is preserved verbatim (rendered as
//! pretty JSON) for diagnostics.

use serde_json::Value;
use thiserror::Error;

use crate::instance::SpecError;
use crate::resolver::ResourceKind;
use crate::transport::{ApiResponse, TransportError};
use crate::types::InstanceId;

/// Errors raised while talking to the compute API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the request never produced an HTTP response.
    #[error("{operation}: transport failure: {message}")]
    Transport {
        /// Operation being performed.
        operation: &'static str,
        /// Message from the HTTP client.
        message: String,
    },
    /// Raised for 401 and 403 responses.
    #[error("{operation}: authentication rejected (HTTP {status}): {body}")]
    Auth {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Raised for 404 responses.
    #[error("{operation}: not found (HTTP 404): {body}")]
    NotFound {
        /// Operation being performed.
        operation: &'static str,
        /// Raw response body.
        body: String,
    },
    /// Raised when a name is absent from an exhausted collection.
    #[error("{kind} named '{name}' not found")]
    UnknownName {
        /// Collection that was searched.
        kind: ResourceKind,
        /// Name that was requested.
        name: String,
    },
    /// Raised for 400, 409, and 422 responses.
    #[error("{operation}: request rejected (HTTP {status}): {body}")]
    Validation {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Raised for 429 responses.
    #[error("{operation}: rate limited (HTTP 429): {body}")]
    RateLimited {
        /// Operation being performed.
        operation: &'static str,
        /// Raw response body.
        body: String,
    },
    /// Raised for 5xx responses.
    #[error("{operation}: provider error (HTTP {status}): {body}")]
    Server {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Raised for any other status, including a success code other than the
    /// one the operation expects.
    #[error("{operation}: expected HTTP {expected}, got {status}: {body}")]
    UnexpectedStatus {
        /// Operation being performed.
        operation: &'static str,
        /// Status the operation requires.
        expected: u16,
        /// Status actually returned.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Raised when a successful response lacks the fields the operation uses.
    #[error("{operation}: malformed response: {message}")]
    Decode {
        /// Operation being performed.
        operation: &'static str,
        /// Description of the problem.
        message: String,
    },
    /// Raised when polling gives up before the instance reaches the target.
    #[error(
        "timed out waiting for instance {instance_id} to become {target} after {polls} polls (last status: {last_status})"
    )]
    Timeout {
        /// Instance being polled.
        instance_id: InstanceId,
        /// Status that was awaited.
        target: String,
        /// Status observed on the final poll.
        last_status: String,
        /// Number of polls performed.
        polls: u32,
    },
    /// Raised when the instance reaches a failure status while polling.
    #[error("instance {instance_id} entered failure status {status}")]
    InstanceFailed {
        /// Instance being polled.
        instance_id: InstanceId,
        /// Failure status reported by the provider.
        status: String,
    },
    /// Raised when an instance has no public address to report.
    #[error("instance {instance_id} has no public IP address")]
    MissingPublicIp {
        /// Instance being inspected.
        instance_id: InstanceId,
    },
    /// Raised when an instance specification fails validation.
    #[error("invalid instance specification: {0}")]
    InvalidSpec(#[from] SpecError),
}

/// Coarse classification of [`ApiError`] for callers that only need to know
/// what kind of failure occurred.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// No HTTP response was received.
    Transport,
    /// Credentials were rejected.
    Auth,
    /// The addressed resource or name does not exist.
    NotFound,
    /// The provider or local validation rejected the request.
    Validation,
    /// The provider failed or answered with an unexpected status.
    Server,
    /// A response could not be interpreted.
    Decode,
    /// Polling gave up.
    Timeout,
    /// The instance is in a state the flow cannot continue from.
    ProviderState,
}

impl ApiError {
    /// Classifies a response whose status differs from `expected`.
    #[must_use]
    pub fn from_response(operation: &'static str, expected: u16, response: &ApiResponse) -> Self {
        let body = render_body(&response.body);
        match response.status {
            401 | 403 => Self::Auth {
                operation,
                status: response.status,
                body,
            },
            404 => Self::NotFound { operation, body },
            400 | 409 | 422 => Self::Validation {
                operation,
                status: response.status,
                body,
            },
            429 => Self::RateLimited { operation, body },
            500..=599 => Self::Server {
                operation,
                status: response.status,
                body,
            },
            status => Self::UnexpectedStatus {
                operation,
                expected,
                status,
                body,
            },
        }
    }

    /// Wraps a transport failure for the given operation.
    #[must_use]
    pub fn transport(operation: &'static str, err: &TransportError) -> Self {
        Self::Transport {
            operation,
            message: err.to_string(),
        }
    }

    /// Builds a [`ApiError::Decode`] for the given operation.
    #[must_use]
    pub fn decode(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            operation,
            message: message.into(),
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::NotFound { .. } | Self::UnknownName { .. } => ErrorKind::NotFound,
            Self::Validation { .. } | Self::InvalidSpec(_) => ErrorKind::Validation,
            Self::RateLimited { .. } | Self::Server { .. } | Self::UnexpectedStatus { .. } => {
                ErrorKind::Server
            }
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InstanceFailed { .. } | Self::MissingPublicIp { .. } => ErrorKind::ProviderState,
        }
    }
}

/// Renders a response body for error messages. JSON objects are printed with
/// sorted keys; plain text bodies are returned unchanged.
pub(crate) fn render_body(body: &Value) -> String {
    match body {
        Value::Null => String::from("<empty body>"),
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Ensures `response` carries exactly the `expected` status.
pub(crate) fn expect_status(
    operation: &'static str,
    expected: u16,
    response: &ApiResponse,
) -> Result<(), ApiError> {
    if response.status == expected {
        Ok(())
    } else {
        Err(ApiError::from_response(operation, expected, response))
    }
}
