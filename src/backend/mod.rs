// Hosted backend-as-a-service seams: authentication and row storage

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::query::{QueryResult, RequestContext};

/// Error reported by the backend, carrying its message verbatim
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, Some(401))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Token bundle issued by the backend; treated as opaque outside backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= Utc::now().timestamp(),
            None => false,
        }
    }
}

/// Result of sign-in and sign-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub user: Option<User>,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResult {
    pub email: String,
    pub redirect_to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignUpOptions {
    /// Stored as user metadata on the new account
    pub data: Map<String, Value>,
    pub email_redirect_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::InitialSession => "INITIAL_SESSION",
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated => "USER_UPDATED",
            AuthEvent::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

impl std::fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// Authentication primitives of the backend
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SessionData, BackendError>;

    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> Result<SessionData, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<ResetResult, BackendError>;

    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    async fn get_user(&self) -> Result<Option<User>, BackendError>;

    /// Receive every auth-state change from now on
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}

/// Row storage primitives of the backend
#[async_trait]
pub trait DataBackend: Send + Sync {
    async fn execute(&self, request: &RequestContext) -> Result<QueryResult, BackendError>;
}

/// Capacity of auth event channels
pub const AUTH_EVENT_CAPACITY: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_deserializes_token_response() {
        let session: Session = serde_json::from_value(json!({
            "access_token": "abc",
            "refresh_token": "def",
            "expires_in": 3600,
            "user": { "id": "u1", "email": "a@b.com" }
        }))
        .unwrap();

        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.user.email.as_deref(), Some("a@b.com"));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_auth_event_wire_names() {
        assert_eq!(serde_json::to_value(AuthEvent::SignedIn).unwrap(), json!("SIGNED_IN"));
        assert_eq!(AuthEvent::PasswordRecovery.to_string(), "PASSWORD_RECOVERY");
    }
}
