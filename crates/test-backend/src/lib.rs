//! A scripted loopback HTTP server standing in for real backends in tests.
//!
//! Routes are registered up front with the responses they should serve.
//! Every request the server receives is recorded, so tests can assert on
//! what the client actually sent.
//!
//! # Note
//!
//! Every path is served by a single fallback handler, so unknown routes
//! answer `404` and are still recorded. You should only use it for
//! testing.

mod preset;

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::{StreamExt, stream};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub use preset::*;

/// A request received by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Returns the first value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Parses the body as JSON, `Value::Null` if it isn't.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

type RouteKey = (Method, String);

#[derive(Default)]
struct Routes {
    // The last response of a route keeps being served once the ones
    // before it are used up.
    routes: HashMap<RouteKey, VecDeque<PresetResponse>>,
    requests: Vec<RecordedRequest>,
}

impl Routes {
    fn respond(&mut self, req: RecordedRequest) -> PresetResponse {
        let key = (req.method.clone(), req.path.clone());
        self.requests.push(req);
        let Some(queue) = self.routes.get_mut(&key) else {
            return PresetResponse::status(404);
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| PresetResponse::status(404))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| PresetResponse::status(404))
        }
    }
}

/// A running loopback backend. The server stops when this is dropped.
pub struct TestBackend {
    addr: SocketAddr,
    state: Arc<Mutex<Routes>>,
    task: JoinHandle<()>,
}

impl TestBackend {
    /// Binds to an ephemeral local port and starts serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test backend");
        let addr = listener.local_addr().expect("listener has no address");
        let state = Arc::new(Mutex::new(Routes::default()));
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                eprintln!("test backend stopped: {err}");
            }
        });
        Self { addr, state, task }
    }

    /// Returns a base URL that nothing is listening on.
    pub async fn unused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind a spare port");
        let addr = listener.local_addr().expect("listener has no address");
        drop(listener);
        format!("http://{addr}")
    }

    /// Returns the base URL of this backend, without a trailing slash.
    #[inline]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Adds a response for `method` and `path`.
    ///
    /// Responses registered for the same route are served in order.
    pub fn route(&self, method: Method, path: &str, response: PresetResponse) {
        let mut state = self.state.lock().expect("state is poisoned");
        state
            .routes
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(response);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().expect("state is poisoned").requests.clone()
    }

    /// Returns the requests received for `method` and `path`.
    pub fn requests_to(
        &self,
        method: Method,
        path: &str,
    ) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    State(state): State<Arc<Mutex<Routes>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes());
            (name.as_str().to_owned(), value.into_owned())
        })
        .collect();
    let req = RecordedRequest {
        method,
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        headers,
        body: body.to_vec(),
    };
    let preset = state.lock().expect("state is poisoned").respond(req);

    let mut builder = Response::builder().status(preset.status);
    for (name, value) in &preset.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let body = if preset.chunked {
        let pieces = stream::iter(preset.chunks).then(|piece| async move {
            // Give the client a chance to observe each piece on its own.
            sleep(Duration::from_millis(2)).await;
            Ok::<_, io::Error>(piece)
        });
        let abort = preset.aborted.then(|| {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "aborted"))
        });
        Body::from_stream(pieces.chain(stream::iter(abort)))
    } else {
        Body::from(preset.chunks.concat())
    };
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
