#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use billo_client::backend::memory::MemoryBackend;
use billo_client::config::AppConfig;
use billo_client::services::Services;
use billo_client::storage::MemoryTokenStore;

pub const WAITER_EMAIL: &str = "ada@billo.test";
pub const WAITER_PASSWORD: &str = "secret123";

pub const STUB_ANON_KEY: &str = "stub-anon-key";
pub const STUB_ACCESS_TOKEN: &str = "stub-access-token";
pub const STUB_USER_ID: &str = "user-1";

/// Services over a fresh in-memory backend with one waiter account
pub fn memory_services() -> (Arc<MemoryBackend>, Services) {
    let backend = Arc::new(MemoryBackend::new());
    let mut metadata = Map::new();
    metadata.insert("full_name".to_string(), json!("Ada Waiter"));
    metadata.insert("role".to_string(), json!("waiter"));
    metadata.insert("restaurant_id".to_string(), json!("r1"));
    backend.add_account(WAITER_EMAIL, WAITER_PASSWORD, metadata);

    let services = Services::new(
        backend.clone(),
        backend.clone(),
        Arc::new(MemoryTokenStore::new()),
        &AppConfig::default(),
    );
    (backend, services)
}

/// One request as the stub saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[derive(Clone, Default)]
struct StubState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Minimal auth (GoTrue) and REST (PostgREST) API on a free local port
pub struct StubServer {
    pub port: u16,
    pub base_url: String,
    state: StubState,
    task: tokio::task::JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind stub server")?;

        let state = StubState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { port, base_url, state, task })
    }

    /// Client configuration pointing at this stub
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.backend.url = self.base_url.clone();
        config.backend.anon_key = STUB_ANON_KEY.to_string();
        config
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn stub_user() -> Value {
    json!({
        "id": STUB_USER_ID,
        "email": WAITER_EMAIL,
        "user_metadata": {"full_name": "Ada Waiter", "role": "waiter"},
    })
}

fn stub_session() -> Value {
    json!({
        "access_token": STUB_ACCESS_TOKEN,
        "refresh_token": "stub-refresh-token",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": chrono::Utc::now().timestamp() + 3600,
        "user": stub_user(),
    })
}

async fn handle(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();

    let bearer = headers.get("authorization").cloned().unwrap_or_default();
    let wants_object = headers
        .get("accept")
        .is_some_and(|accept| accept.contains("vnd.pgrst.object+json"));
    let query = uri.query().unwrap_or_default().to_string();

    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: body.clone(),
    });

    match (method, uri.path()) {
        (Method::POST, "/auth/v1/token") if query.contains("grant_type=password") => {
            if body["email"] == json!(WAITER_EMAIL) && body["password"] == json!(WAITER_PASSWORD) {
                (StatusCode::OK, Json(stub_session())).into_response()
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant", "error_description": "Invalid login credentials"})),
                )
                    .into_response()
            }
        }
        (Method::POST, "/auth/v1/token") => (StatusCode::OK, Json(stub_session())).into_response(),
        (Method::POST, "/auth/v1/signup") => {
            if body["email"] == json!(WAITER_EMAIL) {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"code": 422, "error_code": "user_already_exists", "msg": "User already registered"})),
                )
                    .into_response()
            } else {
                // Email confirmation pending: only the user comes back
                let user = json!({"id": "user-2", "email": body["email"], "user_metadata": body["data"]});
                (StatusCode::OK, Json(user)).into_response()
            }
        }
        (Method::POST, "/auth/v1/logout") => StatusCode::NO_CONTENT.into_response(),
        (Method::POST, "/auth/v1/recover") => (StatusCode::OK, Json(json!({}))).into_response(),
        (Method::GET, "/auth/v1/user") => {
            if bearer == format!("Bearer {}", STUB_ACCESS_TOKEN) {
                (StatusCode::OK, Json(stub_user())).into_response()
            } else {
                (StatusCode::UNAUTHORIZED, Json(json!({"msg": "invalid JWT"}))).into_response()
            }
        }
        (Method::GET, "/rest/v1/profiles") => {
            let profile = json!({"id": STUB_USER_ID, "full_name": "Ada Waiter", "role": "waiter"});
            if wants_object {
                (StatusCode::OK, Json(profile)).into_response()
            } else {
                (StatusCode::OK, Json(json!([profile]))).into_response()
            }
        }
        (Method::PATCH, "/rest/v1/profiles") => {
            let mut profile = json!({"id": STUB_USER_ID, "full_name": "Ada Waiter", "role": "waiter"});
            if let (Some(row), Some(changes)) = (profile.as_object_mut(), body.as_object()) {
                row.extend(changes.clone());
            }
            (StatusCode::OK, Json(profile)).into_response()
        }
        (Method::GET, "/rest/v1/tabs") => {
            if bearer == format!("Bearer {}", STUB_ACCESS_TOKEN) {
                (StatusCode::OK, Json(json!([{"id": "t1", "opened_by": STUB_USER_ID}]))).into_response()
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"code": "PGRST301", "message": "JWT expired"})),
                )
                    .into_response()
            }
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({"message": "not found"}))).into_response(),
    }
}
