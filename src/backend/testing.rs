//! In-process fake HTTP API for backend tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;
use tokio::net::TcpListener;

/// One request the fake server received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Default)]
struct FakeState {
    routes: Mutex<HashMap<String, (StatusCode, Value)>>,
    calls: Mutex<Vec<Recorded>>,
}

/// Canned responses keyed by `"METHOD /path"`; anything else is a 404.
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, route: &str, status: u16, body: Value) -> &Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(route.to_string(), (status, body));
        self
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Recorded requests other than `GET`s.
    pub fn mutations(&self) -> Vec<Recorded> {
        self.calls().into_iter().filter(|c| c.method != "GET").collect()
    }

    /// Bind to an ephemeral port and return the base URL.
    pub async fn serve(&self) -> String {
        let app = Router::new()
            .fallback(handle)
            .with_state(self.state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let path = uri.path().to_string();
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let key = format!("{} {}", method, path);
    state.calls.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path,
        headers,
        body,
    });
    match state.routes.lock().unwrap().get(&key) {
        Some((status, body)) => (*status, Json(body.clone())),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "message": "Not Found" })),
        ),
    }
}
