//! Test support utilities shared across unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

use crate::transport::{
    ApiRequest, ApiResponse, Method, Transport, TransportError, TransportFuture,
};

/// Scripted transport that replays pre-seeded responses per route in FIFO
/// order and records every request it receives.
///
/// Routes are keyed by method and path; query parameters are ignored for
/// matching, so successive pages of a collection are scripted by pushing
/// several responses for the same route. Requests to a route with no queued
/// response receive a `404` with a JSON error body, mirroring the provider's
/// answer for unknown identifiers.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    routes: HashMap<(Method, String), VecDeque<Scripted>>,
    requests: Vec<ApiRequest>,
}

#[derive(Debug)]
struct Scripted {
    result: Result<ApiResponse, TransportError>,
    latency: Duration,
}

impl ScriptedTransport {
    /// Creates a transport with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, method: Method, path: &str, scripted: Scripted) {
        self.lock()
            .routes
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(scripted);
    }

    /// Queues a response for `method` and `path`.
    pub fn push(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push_delayed(method, path, status, body, Duration::ZERO);
    }

    /// Queues a response that is only delivered after `latency` has elapsed.
    /// The request is recorded as soon as it is sent.
    pub fn push_delayed(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: Value,
        latency: Duration,
    ) {
        self.enqueue(
            method,
            path,
            Scripted {
                result: Ok(ApiResponse { status, body }),
                latency,
            },
        );
    }

    /// Queues a transport failure for `method` and `path`.
    pub fn push_transport_failure(&self, method: Method, path: &str, message: &str) {
        self.enqueue(
            method,
            path,
            Scripted {
                result: Err(TransportError::new(message)),
                latency: Duration::ZERO,
            },
        );
    }

    /// Returns a snapshot of all requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    /// Returns the requests sent to `method` and `path`, in order.
    #[must_use]
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<ApiRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .cloned()
            .collect()
    }

    /// Returns how many requests were sent to `method` and `path`.
    #[must_use]
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    /// Returns how many responses are still queued across all routes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().routes.values().map(VecDeque::len).sum()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            let scripted = {
                let mut state = self.lock();
                state.requests.push(request.clone());
                let key = (request.method, request.path.clone());
                state.routes.get_mut(&key).and_then(VecDeque::pop_front)
            };
            let Some(Scripted { result, latency }) = scripted else {
                return Ok(ApiResponse {
                    status: 404,
                    body: json!({
                        "code": "not_found",
                        "message": format!("no scripted response for {} {}", request.method, request.path),
                    }),
                });
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }
}

/// Builds a list-collection body such as `{"images": [...], "total_count": n}`.
#[must_use]
pub fn list_body(field: &str, entries: &[(&str, &str)], total_count: Option<u64>) -> Value {
    let items: Vec<Value> = entries
        .iter()
        .map(|(name, id)| json!({"name": name, "id": id}))
        .collect();
    let mut body = serde_json::Map::new();
    body.insert(field.to_owned(), Value::Array(items));
    if let Some(total) = total_count {
        body.insert(String::from("total_count"), json!(total));
    }
    Value::Object(body)
}

/// Builds an instance envelope as returned by create and get.
#[must_use]
pub fn instance_body(id: &str, status: &str, public_ip: Option<&str>) -> Value {
    json!({
        "instance": {
            "id": id,
            "name": "test-instance",
            "status": status,
            "public_ip": public_ip,
        }
    })
}

/// Builds a snapshot envelope as returned by snapshot creation.
#[must_use]
pub fn snapshot_body(id: &str, instance_id: &str, name: &str) -> Value {
    json!({
        "snapshot": {
            "id": id,
            "name": name,
            "status": "creating",
            "resource_id": instance_id,
        }
    })
}

/// Builds a provider error body.
#[must_use]
pub fn error_body(code: &str, message: &str) -> Value {
    json!({"code": code, "message": message})
}
