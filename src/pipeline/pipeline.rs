// Interceptor pipeline around backend data operations

use std::sync::Arc;
use std::time::Instant;

use crate::backend::DataBackend;
use crate::pipeline::chain::{Chain, Disposer};
use crate::pipeline::error::PipelineError;
use crate::pipeline::traits::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
use crate::query::{RequestContext, ResponseEnvelope};

/// Ordered request, response and error chains consulted on every call.
///
/// Chains are read at call time, so interceptors registered after a client was
/// built still apply to its later calls.
pub struct InterceptorPipeline {
    request: Chain<dyn RequestInterceptor>,
    response: Chain<dyn ResponseInterceptor>,
    error: Chain<dyn ErrorInterceptor>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self {
            request: Chain::new(),
            response: Chain::new(),
            error: Chain::new(),
        }
    }

    pub fn add_request_interceptor<I: RequestInterceptor + 'static>(&self, interceptor: I) -> Disposer {
        tracing::debug!("Registered request interceptor '{}'", interceptor.name());
        let interceptor: Arc<dyn RequestInterceptor> = Arc::new(interceptor);
        self.request.push(interceptor)
    }

    pub fn add_response_interceptor<I: ResponseInterceptor + 'static>(&self, interceptor: I) -> Disposer {
        tracing::debug!("Registered response interceptor '{}'", interceptor.name());
        let interceptor: Arc<dyn ResponseInterceptor> = Arc::new(interceptor);
        self.response.push(interceptor)
    }

    pub fn add_error_interceptor<I: ErrorInterceptor + 'static>(&self, interceptor: I) -> Disposer {
        tracing::debug!("Registered error interceptor '{}'", interceptor.name());
        let interceptor: Arc<dyn ErrorInterceptor> = Arc::new(interceptor);
        self.error.push(interceptor)
    }

    /// Number of (request, response, error) interceptors currently registered
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.request.len(), self.response.len(), self.error.len())
    }

    /// Drop every registration, e.g. at shutdown
    pub fn clear(&self) {
        self.request.clear();
        self.response.clear();
        self.error.clear();
    }

    /// Run one data operation through the chains.
    ///
    /// Any failure is reported to every error interceptor and then returned
    /// unchanged.
    pub async fn execute<B>(&self, backend: &B, ctx: RequestContext) -> Result<ResponseEnvelope, PipelineError>
    where
        B: DataBackend + ?Sized,
    {
        let start_time = Instant::now();
        let operation = ctx.operation;
        let collection = ctx.collection.clone();

        match self.run(backend, ctx).await {
            Ok(response) => {
                tracing::debug!(
                    "Pipeline {} on '{}' completed in {:?}",
                    operation, collection, start_time.elapsed()
                );
                Ok(response)
            }
            Err(error) => Err(self.handle_error(error).await),
        }
    }

    async fn run<B>(&self, backend: &B, ctx: RequestContext) -> Result<ResponseEnvelope, PipelineError>
    where
        B: DataBackend + ?Sized,
    {
        let ctx = self.process_request(ctx).await?;
        let result = backend.execute(&ctx).await?;
        self.process_response(ResponseEnvelope::new(result, ctx)).await
    }

    async fn process_request(&self, mut ctx: RequestContext) -> Result<RequestContext, PipelineError> {
        for interceptor in self.request.snapshot() {
            match interceptor.on_fulfilled(&mut ctx).await {
                Ok(Some(replacement)) => ctx = replacement,
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!("Request interceptor '{}' failed: {}", interceptor.name(), error);
                    interceptor.on_rejected(&error).await;
                    return Err(error);
                }
            }
        }
        Ok(ctx)
    }

    async fn process_response(&self, mut response: ResponseEnvelope) -> Result<ResponseEnvelope, PipelineError> {
        for interceptor in self.response.snapshot() {
            match interceptor.on_fulfilled(&mut response).await {
                Ok(Some(replacement)) => response = replacement,
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!("Response interceptor '{}' failed: {}", interceptor.name(), error);
                    interceptor.on_rejected(&error).await;
                    return Err(error);
                }
            }
        }
        Ok(response)
    }

    async fn handle_error(&self, error: PipelineError) -> PipelineError {
        match error.backend() {
            Some(cause) => tracing::error!(status = ?cause.status, code = ?cause.code, "API error: {}", cause.message),
            None => tracing::error!("API error: {}", error),
        }

        for handler in self.error.snapshot() {
            if let Err(observer_error) = handler.on_error(&error).await {
                tracing::error!("Error in error interceptor '{}': {}", handler.name(), observer_error);
            }
        }

        error
    }
}

impl Default for InterceptorPipeline {
    fn default() -> Self {
        Self::new()
    }
}
