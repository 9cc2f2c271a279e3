//! In-process mock of the careerdesk backend for tests.
//!
//! Bearer-protected paths accept exactly one access token at a time. The
//! refresh endpoint rotates tokens according to `rotate()` and makes the new
//! access token the accepted one. Every non-refresh request is recorded with
//! its query string and `Authorization` header.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use session_auth::{SIGN_IN_PATH, TOKEN_REFRESH_PATH, is_public_path};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub(crate) struct Seen {
    pub method: String,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct MockState {
    valid_access: Mutex<Option<String>>,
    rotations: Mutex<HashMap<String, (String, String)>>,
    refresh_delay: Mutex<Duration>,
    path_delays: Mutex<HashMap<String, Duration>>,
    refresh_calls: AtomicUsize,
    reject_all: AtomicBool,
    canned: Mutex<HashMap<(String, String), (u16, serde_json::Value)>>,
    seen: Mutex<Vec<Seen>>,
}

pub(crate) struct MockBackend {
    pub url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let app = axum::Router::new()
            .fallback(handle)
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Make `access` the only accepted bearer token.
    pub fn accept(&self, access: &str) {
        *self.state.valid_access.lock().unwrap() = Some(access.to_string());
    }

    /// Refreshing with `refresh` yields `access`/`new_refresh`.
    pub fn rotate(&self, refresh: &str, access: &str, new_refresh: &str) {
        self.state.rotations.lock().unwrap().insert(
            refresh.to_string(),
            (access.to_string(), new_refresh.to_string()),
        );
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    /// Hold requests to `path` before the auth check.
    pub fn set_delay(&self, path: &str, delay: Duration) {
        self.state
            .path_delays
            .lock()
            .unwrap()
            .insert(path.to_string(), delay);
    }

    /// Answer 401 on every protected path, whatever the token.
    pub fn reject_all(&self) {
        self.state.reject_all.store(true, Ordering::SeqCst);
    }

    /// Fixed response for `method path`, served after the auth check.
    pub fn canned(&self, method: &str, path: &str, status: u16, body: serde_json::Value) {
        self.state
            .canned
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body));
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.state.seen.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> Vec<Seen> {
        self.seen().into_iter().filter(|s| s.path == path).collect()
    }
}

async fn handle(State(state): State<Arc<MockState>>, request: Request<Body>) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let authorization = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    if path == TOKEN_REFRESH_PATH {
        return refresh(&state, &body).await;
    }

    state.seen.lock().unwrap().push(Seen {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        authorization: authorization.clone(),
        body: body.clone(),
    });

    if path == SIGN_IN_PATH {
        return sign_in(&state, &body);
    }

    let delay = state.path_delays.lock().unwrap().get(&path).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if !is_public_path(&path) {
        let valid = state.valid_access.lock().unwrap().clone();
        let accepted = !state.reject_all.load(Ordering::SeqCst)
            && valid.is_some_and(|token| {
                authorization.as_deref() == Some(format!("Bearer {token}").as_str())
            });
        if !accepted {
            return (
                StatusCode::UNAUTHORIZED,
                axum::Json(serde_json::json!({"detail": "Given token not valid for any token type"})),
            )
                .into_response();
        }
    }

    let canned = state
        .canned
        .lock()
        .unwrap()
        .get(&(method.clone(), path.clone()))
        .cloned();
    if let Some((status, body)) = canned {
        return (StatusCode::from_u16(status).unwrap(), axum::Json(body)).into_response();
    }

    axum::Json(serde_json::json!({
        "method": method,
        "path": path,
        "query": query,
        "authorization": authorization,
        "body": body,
    }))
    .into_response()
}

async fn refresh(state: &MockState, body: &serde_json::Value) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    let presented = body["refresh"].as_str().unwrap_or_default().to_string();
    let rotation = state.rotations.lock().unwrap().get(&presented).cloned();
    match rotation {
        Some((access, new_refresh)) => {
            *state.valid_access.lock().unwrap() = Some(access.clone());
            axum::Json(serde_json::json!({"access": access, "refresh": new_refresh})).into_response()
        }
        None => (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"detail": "Token is invalid or expired"})),
        )
            .into_response(),
    }
}

/// Accepts password `hunter2` for any email and issues `A1`/`R1`.
fn sign_in(state: &MockState, body: &serde_json::Value) -> Response {
    if body["password"] != "hunter2" {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }
    *state.valid_access.lock().unwrap() = Some("A1".to_string());
    axum::Json(serde_json::json!({
        "access": "A1",
        "refresh": "R1",
        "expires_in": 3600,
        "user": {"id": 7, "email": body["email"], "first_name": "Ada"},
    }))
    .into_response()
}
