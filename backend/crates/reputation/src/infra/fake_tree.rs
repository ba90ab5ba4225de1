//! In-process stand-in for the hosted tree's REST surface, for `RestTreeStore` tests
//!
//! Serves `{path}.json` over a local axum listener. Resolves the
//! `timestamp`/`increment` server values, answers `POST` with a generated
//! `name`, and streams a `put` event on every write to event-stream clients.
//! Every request is recorded.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header::ACCEPT};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::any;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Request as the server saw it
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Default)]
struct Inner {
    root: Value,
    requests: Vec<Recorded>,
    failures: Vec<StatusCode>,
    next_id: u64,
}

#[derive(Clone)]
pub(crate) struct FakeTree {
    inner: Arc<Mutex<Inner>>,
    writes: Arc<watch::Sender<u64>>,
    now_ms: i64,
}

impl FakeTree {
    pub fn new(now_ms: i64) -> Self {
        let (writes, _) = watch::channel(0);
        Self {
            inner: Arc::default(),
            writes: Arc::new(writes),
            now_ms,
        }
    }

    /// Bind to an ephemeral port; returns the base URL
    pub async fn serve(&self) -> String {
        let app = Router::new()
            .route("/{*path}", any(handle))
            .with_state(self.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn seed(&self, path: &str, value: Value) {
        set(&mut self.lock().root, &segments(path), value);
    }

    pub fn get(&self, path: &str) -> Value {
        get(&self.lock().root, &segments(path))
    }

    /// Answer the next request with `status`
    pub fn fail_next(&self, status: StatusCode) {
        self.lock().failures.push(status);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.lock().requests.clone()
    }

    pub fn requests_with(&self, method: Method) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method)
            .collect()
    }

    fn write(&self, path: &[&str], value: Value) {
        set(&mut self.lock().root, path, value);
        self.writes.send_modify(|count| *count += 1);
    }

    /// Replace `{".sv": ...}` placeholders against the current node value
    fn resolve(&self, body: Value, current: &Value) -> Value {
        match body.get(".sv") {
            Some(Value::String(name)) if name == "timestamp" => json!(self.now_ms),
            Some(Value::Object(op)) => {
                let delta = op.get("increment").and_then(Value::as_f64).unwrap_or(0.0);
                json!(current.as_f64().unwrap_or(0.0) + delta)
            }
            _ => body,
        }
    }
}

async fn handle(
    State(tree): State<FakeTree>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = path.trim_end_matches(".json").to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let failure = {
        let mut inner = tree.lock();
        inner.requests.push(Recorded {
            method: method.clone(),
            path: path.clone(),
            query: query.clone(),
            body: body.clone(),
        });
        (!inner.failures.is_empty()).then(|| inner.failures.remove(0))
    };
    if let Some(status) = failure {
        return status.into_response();
    }

    let segments = segments(&path);
    let streaming = headers
        .get(ACCEPT)
        .is_some_and(|accept| accept.as_bytes() == b"text/event-stream");

    match method {
        Method::GET if streaming => events(tree.writes.subscribe()).into_response(),
        Method::GET => {
            let value = tree.get(&path);
            let shallow = query.get("shallow").is_some_and(|flag| flag == "true");
            match value {
                Value::Object(map) if shallow => {
                    let keys: serde_json::Map<String, Value> =
                        map.keys().map(|key| (key.clone(), json!(true))).collect();
                    Json(keys).into_response()
                }
                value => Json(value).into_response(),
            }
        }
        Method::PUT => {
            let value = tree.resolve(body, &tree.get(&path));
            tree.write(&segments, value.clone());
            Json(value).into_response()
        }
        Method::POST => {
            let name = {
                let mut inner = tree.lock();
                inner.next_id += 1;
                format!("-Fake{:06}", inner.next_id)
            };
            let mut child = segments.clone();
            child.push(&name);
            tree.write(&child, body);
            Json(json!({ "name": name })).into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// One `put` now, then one per write
fn events(
    writes: watch::Receiver<u64>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let stream = futures_util::stream::unfold((writes, true), |(mut writes, first)| async move {
        if !first && writes.changed().await.is_err() {
            return None;
        }
        let event = Event::default()
            .event("put")
            .data(r#"{"path":"/","data":null}"#);
        Some((Ok(event), (writes, false)))
    });
    Sse::new(stream)
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn get(root: &Value, path: &[&str]) -> Value {
    path.iter()
        .try_fold(root, |node, segment| node.get(*segment))
        .cloned()
        .unwrap_or(Value::Null)
}

fn set(root: &mut Value, path: &[&str], value: Value) {
    let mut node = root;
    for segment in path {
        if !node.is_object() {
            *node = json!({});
        }
        node = &mut node[*segment];
    }
    *node = value;
}
