// Stock interceptors installed by the service context

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::pipeline::{ErrorInterceptor, PipelineError, RequestInterceptor};
use crate::query::RequestContext;
use crate::session::ProfileCache;
use crate::storage::TokenStore;

/// Adds `Authorization: Bearer <token>` from the locally stored session
pub struct BearerTokenInterceptor {
    store: Arc<dyn TokenStore>,
    storage_key: String,
}

impl BearerTokenInterceptor {
    pub fn new(store: Arc<dyn TokenStore>, storage_key: impl Into<String>) -> Self {
        Self {
            store,
            storage_key: storage_key.into(),
        }
    }

    /// Access token from the stored value: a session object or a bare token
    fn token(&self) -> Option<String> {
        let raw = match self.store.get(&self.storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read auth token: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(session)) => session
                .get("access_token")
                .and_then(Value::as_str)
                .map(str::to_string),
            Ok(Value::String(token)) => Some(token),
            _ => Some(raw),
        }
    }
}

#[async_trait]
impl RequestInterceptor for BearerTokenInterceptor {
    fn name(&self) -> &str {
        "bearer-token"
    }

    async fn on_fulfilled(&self, ctx: &mut RequestContext) -> Result<Option<RequestContext>, PipelineError> {
        if ctx.header("authorization").is_none() {
            if let Some(token) = self.token() {
                ctx.headers.insert("Authorization".to_string(), format!("Bearer {}", token));
            }
        }
        Ok(None)
    }
}

/// Tags every request with the client identifier
pub struct ClientInfoInterceptor {
    client_info: String,
}

impl ClientInfoInterceptor {
    pub fn new(client_info: impl Into<String>) -> Self {
        Self {
            client_info: client_info.into(),
        }
    }
}

#[async_trait]
impl RequestInterceptor for ClientInfoInterceptor {
    fn name(&self) -> &str {
        "client-info"
    }

    async fn on_fulfilled(&self, ctx: &mut RequestContext) -> Result<Option<RequestContext>, PipelineError> {
        if ctx.header("x-client-info").is_none() {
            ctx.headers.insert("X-Client-Info".to_string(), self.client_info.clone());
        }
        Ok(None)
    }
}

/// Drops the cached profile when the backend answers 401
pub struct UnauthorizedInterceptor {
    cache: ProfileCache,
}

impl UnauthorizedInterceptor {
    pub fn new(cache: ProfileCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ErrorInterceptor for UnauthorizedInterceptor {
    fn name(&self) -> &str {
        "unauthorized"
    }

    async fn on_error(&self, error: &PipelineError) -> Result<(), PipelineError> {
        if error.status() == Some(401) {
            tracing::warn!("Backend rejected credentials, clearing cached profile");
            self.cache.invalidate();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operation;
    use crate::storage::MemoryTokenStore;

    #[tokio::test]
    async fn test_bearer_token_from_stored_session() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .set("sb-auth-token", r#"{"access_token":"abc","user":{"id":"u1"}}"#)
            .unwrap();
        let interceptor = BearerTokenInterceptor::new(store, "sb-auth-token");

        let mut ctx = RequestContext::new(Operation::Select, "tabs");
        let replaced = interceptor.on_fulfilled(&mut ctx).await.unwrap();

        assert!(replaced.is_none());
        assert_eq!(ctx.header("authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_bearer_token_keeps_existing_header() {
        let store = Arc::new(MemoryTokenStore::new());
        store.set("sb-auth-token", "raw-token").unwrap();
        let interceptor = BearerTokenInterceptor::new(store, "sb-auth-token");

        let mut ctx = RequestContext::new(Operation::Select, "tabs").with_header("Authorization", "Bearer mine");
        interceptor.on_fulfilled(&mut ctx).await.unwrap();
        assert_eq!(ctx.header("authorization"), Some("Bearer mine"));
    }

    #[tokio::test]
    async fn test_bearer_token_absent_without_session() {
        let interceptor = BearerTokenInterceptor::new(Arc::new(MemoryTokenStore::new()), "sb-auth-token");
        let mut ctx = RequestContext::new(Operation::Select, "tabs");
        interceptor.on_fulfilled(&mut ctx).await.unwrap();
        assert!(ctx.headers.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_profile() {
        let cache = ProfileCache::new();
        cache.set(serde_json::from_value(serde_json::json!({"id": "u1"})).unwrap());
        let interceptor = UnauthorizedInterceptor::new(cache.clone());

        let error = PipelineError::Backend(crate::backend::BackendError::new("JWT expired").with_status(401));
        interceptor.on_error(&error).await.unwrap();
        assert!(cache.get().is_none());
    }
}
