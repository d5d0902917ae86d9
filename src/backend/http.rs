// reqwest client for a Supabase-compatible auth (GoTrue) and REST (PostgREST) API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use url::Url;

use crate::backend::{
    AuthBackend, AuthEvent, AuthStateChange, BackendError, DataBackend, ResetResult, Session,
    SessionData, SignUpOptions, User, AUTH_EVENT_CAPACITY,
};
use crate::config::AppConfig;
use crate::query::{Operation, QueryResult, RequestContext};
use crate::storage::TokenStore;

const SINGLE_OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Backend reached over HTTP; the session is mirrored into a [`TokenStore`]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    anon_key: String,
    client_info: String,
    storage_key: String,
    store: Arc<dyn TokenStore>,
    events: broadcast::Sender<AuthStateChange>,
}

impl HttpBackend {
    pub fn new(config: &AppConfig, store: Arc<dyn TokenStore>) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(&config.backend.url)
            .map_err(|e| BackendError::new(format!("Invalid backend URL '{}': {}", config.backend.url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backend.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::new(format!("Failed to build HTTP client: {}", e)))?;

        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            client,
            base_url,
            anon_key: config.backend.anon_key.clone(),
            client_info: config.backend.client_info.clone(),
            storage_key: config.auth.storage_key.clone(),
            store,
            events,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::new(format!("Invalid endpoint '{}': {}", path, e)))
    }

    fn stored_session(&self) -> Option<Session> {
        match self.store.get(&self.storage_key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!("Discarding unreadable stored session: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read stored session: {}", e);
                None
            }
        }
    }

    fn persist_session(&self, session: &Session) {
        let stored = serde_json::to_string(session)
            .map_err(crate::storage::StorageError::from)
            .and_then(|raw| self.store.set(&self.storage_key, &raw));
        if let Err(e) = stored {
            tracing::warn!("Failed to persist session: {}", e);
        }
    }

    fn clear_session(&self) {
        if let Err(e) = self.store.remove(&self.storage_key) {
            tracing::warn!("Failed to clear stored session: {}", e);
        }
    }

    fn emit(&self, event: AuthEvent, session: Option<Session>) {
        let _ = self.events.send(AuthStateChange { event, session });
    }

    /// Base request with the API key, client info and bearer token set
    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("X-Client-Info", &self.client_info);
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder.bearer_auth(&self.anon_key),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(u16, Value), BackendError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        let value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap_or(Value::String(body))
        };

        if status.is_success() {
            Ok((status.as_u16(), value))
        } else {
            Err(error_from_body(status.as_u16(), &value))
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let builder = self
            .request(Method::POST, url, None)
            .json(&json!({ "refresh_token": refresh_token }));
        let (_, body) = self.send(builder).await?;
        let session: Session = decode(body)?;

        self.persist_session(&session);
        self.emit(AuthEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }
}

fn transport_error(error: reqwest::Error) -> BackendError {
    let status = error.status().map(|s| s.as_u16());
    BackendError {
        message: error.to_string(),
        status,
        code: Some("transport".to_string()),
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, BackendError> {
    serde_json::from_value(body).map_err(|e| BackendError::new(format!("Unexpected response body: {}", e)))
}

/// Build a backend error from whichever message field the API used
fn error_from_body(status: u16, body: &Value) -> BackendError {
    let message = ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .or_else(|| body.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status));

    let code = ["error_code", "code"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string);

    BackendError {
        message,
        status: Some(status),
        code,
    }
}

fn render_filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SessionData, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let builder = self
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "password": password }));
        let (_, body) = self.send(builder).await?;
        let session: Session = decode(body)?;

        self.persist_session(&session);
        self.emit(AuthEvent::SignedIn, Some(session.clone()));
        Ok(SessionData {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> Result<SessionData, BackendError> {
        let mut url = self.endpoint("auth/v1/signup")?;
        if let Some(redirect_to) = &options.email_redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }

        let builder = self.request(Method::POST, url, None).json(&json!({
            "email": email,
            "password": password,
            "data": options.data,
        }));
        let (_, body) = self.send(builder).await?;

        // With email confirmation enabled only the user comes back
        if body.get("access_token").is_some() {
            let session: Session = decode(body)?;
            self.persist_session(&session);
            self.emit(AuthEvent::SignedIn, Some(session.clone()));
            Ok(SessionData {
                user: Some(session.user.clone()),
                session: Some(session),
            })
        } else {
            let user: User = decode(body)?;
            Ok(SessionData {
                user: Some(user),
                session: None,
            })
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.stored_session() {
            let url = self.endpoint("auth/v1/logout")?;
            let builder = self.request(Method::POST, url, Some(&session.access_token));
            match self.send(builder).await {
                Ok(_) => {}
                // Session already gone on the server side
                Err(e) if matches!(e.status, Some(401) | Some(403) | Some(404)) => {
                    tracing::debug!("Logout ignored stale session: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        self.clear_session();
        self.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<ResetResult, BackendError> {
        let mut url = self.endpoint("auth/v1/recover")?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        let builder = self.request(Method::POST, url, None).json(&json!({ "email": email }));
        self.send(builder).await?;

        Ok(ResetResult {
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
        })
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.stored_session() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        match session.refresh_token.as_deref() {
            Some(refresh_token) => self.refresh_session(refresh_token).await.map(Some),
            None => {
                self.clear_session();
                Ok(None)
            }
        }
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };

        let url = self.endpoint("auth/v1/user")?;
        let builder = self.request(Method::GET, url, Some(&session.access_token));
        let (_, body) = self.send(builder).await?;
        decode(body).map(Some)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl DataBackend for HttpBackend {
    async fn execute(&self, request: &RequestContext) -> Result<QueryResult, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{}", request.collection))?;
        let query = &request.query;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(columns) = &query.columns {
                pairs.append_pair("select", columns);
            }
            for filter in &query.filters {
                pairs.append_pair(&filter.column, &format!("eq.{}", render_filter_value(&filter.value)));
            }
            if !query.order.is_empty() {
                let order = query
                    .order
                    .iter()
                    .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.append_pair("order", &order);
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }

        let method = match request.operation {
            Operation::Select => Method::GET,
            Operation::Insert => Method::POST,
            Operation::Update => Method::PATCH,
            Operation::Delete => Method::DELETE,
        };

        // Headers supplied by interceptors take precedence over the defaults
        let mut builder = self.client.request(method, url).header("apikey", &self.anon_key);
        if request.header("authorization").is_none() {
            let token = self.stored_session().map(|s| s.access_token);
            builder = builder.bearer_auth(token.as_deref().unwrap_or(self.anon_key.as_str()));
        }
        if request.header("x-client-info").is_none() {
            builder = builder.header("X-Client-Info", &self.client_info);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.operation.is_mutation() && query.columns.is_some() {
            builder = builder.header("Prefer", "return=representation");
        }
        if query.single {
            builder = builder.header("Accept", SINGLE_OBJECT_MEDIA_TYPE);
        }
        if let Some(payload) = &query.payload {
            builder = builder.json(payload);
        }

        tracing::debug!("{} {} via REST", request.operation, request.collection);
        let (status, data) = self.send(builder).await?;
        Ok(QueryResult::new(data, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_body_prefers_msg_fields() {
        let err = error_from_body(400, &json!({"error": "invalid_grant", "error_description": "Invalid login credentials"}));
        assert_eq!(err.message, "Invalid login credentials");
        assert_eq!(err.status, Some(400));

        let err = error_from_body(406, &json!({"code": "PGRST116", "message": "JSON object requested"}));
        assert_eq!(err.code.as_deref(), Some("PGRST116"));
    }

    #[test]
    fn test_error_from_body_without_message() {
        let err = error_from_body(500, &Value::Null);
        assert_eq!(err.message, "Request failed with status 500");
    }

    #[test]
    fn test_base_url_gains_trailing_slash() {
        let mut config = AppConfig::default();
        config.backend.url = "http://localhost:54321/project".to_string();
        let store = Arc::new(crate::storage::MemoryTokenStore::new());

        let backend = HttpBackend::new(&config, store).unwrap();
        assert_eq!(
            backend.endpoint("rest/v1/tabs").unwrap().as_str(),
            "http://localhost:54321/project/rest/v1/tabs"
        );
    }
}
