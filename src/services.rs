// Service context: one set of shared services built at startup and passed to consumers

use std::sync::Arc;

use crate::backend::http::HttpBackend;
use crate::backend::{AuthBackend, BackendError, DataBackend};
use crate::client::DataClient;
use crate::config::AppConfig;
use crate::interceptors::{BearerTokenInterceptor, ClientInfoInterceptor, UnauthorizedInterceptor};
use crate::pipeline::{Disposer, InterceptorPipeline};
use crate::session::SessionManager;
use crate::storage::TokenStore;

/// Shared services for the application
pub struct Services {
    pub auth: SessionManager,
    pub data: DataClient,
    pub pipeline: Arc<InterceptorPipeline>,
    pub store: Arc<dyn TokenStore>,
    // Registrations of the stock interceptors, released on shutdown
    defaults: Vec<Disposer>,
}

impl Services {
    /// Wire services over any backend; must be called within a Tokio runtime
    pub fn new(
        auth_backend: Arc<dyn AuthBackend>,
        data_backend: Arc<dyn DataBackend>,
        store: Arc<dyn TokenStore>,
        config: &AppConfig,
    ) -> Self {
        let pipeline = Arc::new(InterceptorPipeline::new());
        let data = DataClient::new(data_backend, pipeline.clone());
        let auth = SessionManager::new(auth_backend, data.clone(), store.clone(), config.auth.clone());

        let defaults = vec![
            pipeline.add_request_interceptor(ClientInfoInterceptor::new(config.backend.client_info.clone())),
            pipeline.add_request_interceptor(BearerTokenInterceptor::new(
                store.clone(),
                config.auth.storage_key.clone(),
            )),
            pipeline.add_error_interceptor(UnauthorizedInterceptor::new(auth.cache().clone())),
        ];

        tracing::debug!("Services ready with {} default interceptors", defaults.len());

        Self {
            auth,
            data,
            pipeline,
            store,
            defaults,
        }
    }

    /// Services over the HTTP backend described by `config`
    pub fn connect(config: &AppConfig, store: Arc<dyn TokenStore>) -> Result<Self, BackendError> {
        let backend = Arc::new(HttpBackend::new(config, store.clone())?);
        Ok(Self::new(backend.clone(), backend, store, config))
    }

    /// Remove the stock interceptors; interceptors added by callers stay
    pub fn shutdown(self) {
        for disposer in self.defaults {
            let _ = disposer.dispose();
        }
        tracing::debug!("Services shut down");
    }
}
