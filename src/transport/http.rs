//! `reqwest` implementation of [`Transport`].

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::{ApiRequest, ApiResponse, Method, Transport, TransportError, TransportFuture};

/// Public endpoint of the Genesis Cloud API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.genesiscloud.com";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_HEADER: &str = "X-Auth-Token";

/// Sends requests over HTTPS, authenticating every call with the API token.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the HTTP client cannot be built, for
    /// example when no TLS backend can be initialised.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| TransportError::new(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Parses a response body, keeping non-JSON payloads as text.
pub(super) fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            let url = self.url(&request.path);
            debug!(method = %request.method, %url, query = ?request.query, "sending request");

            let method_builder = match request.method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
                Method::Delete => self.client.delete(&url),
            };
            let mut builder = method_builder
                .header(AUTH_HEADER, &self.token)
                .header(reqwest::header::CONTENT_TYPE, "application/json");
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| TransportError::new(err.to_string()))?;
            let status = response.status().as_u16();
            let bytes = response
                .bytes()
                .await
                .map_err(|err| TransportError::new(err.to_string()))?;

            debug!(method = %request.method, %url, status, "received response");
            Ok(ApiResponse {
                status,
                body: parse_body(&bytes),
            })
        })
    }
}
