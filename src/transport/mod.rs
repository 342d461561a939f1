//! Transport abstraction for the compute HTTP API.
//!
//! The lifecycle logic never talks to `reqwest` directly; it issues
//! [`ApiRequest`]s through a [`Transport`] and interprets the returned
//! [`ApiResponse`]. [`HttpTransport`] is the production implementation.

mod http;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

pub use http::{DEFAULT_API_BASE_URL, HttpTransport};

/// HTTP methods used by the compute API.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// A request against the compute API, relative to the configured base URL.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path beginning with `/compute/v1`.
    pub path: String,
    /// Query parameters in order.
    pub query: Vec<(&'static str, String)>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Creates a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a `POST` request carrying a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

/// Status code and parsed body returned by the API.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body. Empty bodies are [`Value::Null`]; bodies that are not
    /// JSON are kept as [`Value::String`].
    pub body: Value,
}

/// Raised when a request does not produce an HTTP response.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct TransportError {
    /// Description of the failure.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error from any displayable cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Future returned by transport operations.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>>;

/// Issues authenticated requests against the compute API.
pub trait Transport {
    /// Sends `request` and returns the status code and parsed body.
    ///
    /// Non-success statuses are returned as responses, not errors; only a
    /// missing response is a [`TransportError`].
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        (**self).send(request)
    }
}
