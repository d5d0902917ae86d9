use async_trait::async_trait;

use crate::pipeline::error::PipelineError;
use crate::query::{RequestContext, ResponseEnvelope};

/// Runs before a data operation reaches the backend.
///
/// `on_fulfilled` may edit the context in place and return `None`, or return
/// `Some(context)` to replace it outright. `None` never means "set to empty".
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Interceptor name for logging and error reports
    fn name(&self) -> &str {
        "request"
    }

    async fn on_fulfilled(&self, ctx: &mut RequestContext) -> Result<Option<RequestContext>, PipelineError>;

    /// Sees this interceptor's own failure before it propagates
    async fn on_rejected(&self, _error: &PipelineError) {}
}

/// Runs over the response envelope after the backend call succeeds
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    fn name(&self) -> &str {
        "response"
    }

    async fn on_fulfilled(&self, response: &mut ResponseEnvelope) -> Result<Option<ResponseEnvelope>, PipelineError>;

    async fn on_rejected(&self, _error: &PipelineError) {}
}

/// Observes every pipeline failure; cannot alter or suppress it
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    fn name(&self) -> &str {
        "error"
    }

    async fn on_error(&self, error: &PipelineError) -> Result<(), PipelineError>;
}

type RejectedFn = Box<dyn Fn(&PipelineError) + Send + Sync>;

/// Request interceptor built from plain closures
pub struct RequestFn<F> {
    name: String,
    on_fulfilled: F,
    on_rejected: Option<RejectedFn>,
}

/// Wrap a closure as a request interceptor
pub fn request_fn<F>(name: impl Into<String>, on_fulfilled: F) -> RequestFn<F>
where
    F: Fn(&mut RequestContext) -> Result<Option<RequestContext>, PipelineError> + Send + Sync,
{
    RequestFn {
        name: name.into(),
        on_fulfilled,
        on_rejected: None,
    }
}

impl<F> RequestFn<F> {
    pub fn on_rejected(mut self, handler: impl Fn(&PipelineError) + Send + Sync + 'static) -> Self {
        self.on_rejected = Some(Box::new(handler));
        self
    }
}

#[async_trait]
impl<F> RequestInterceptor for RequestFn<F>
where
    F: Fn(&mut RequestContext) -> Result<Option<RequestContext>, PipelineError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_fulfilled(&self, ctx: &mut RequestContext) -> Result<Option<RequestContext>, PipelineError> {
        (self.on_fulfilled)(ctx)
    }

    async fn on_rejected(&self, error: &PipelineError) {
        if let Some(handler) = &self.on_rejected {
            handler(error);
        }
    }
}

/// Response interceptor built from plain closures
pub struct ResponseFn<F> {
    name: String,
    on_fulfilled: F,
    on_rejected: Option<RejectedFn>,
}

pub fn response_fn<F>(name: impl Into<String>, on_fulfilled: F) -> ResponseFn<F>
where
    F: Fn(&mut ResponseEnvelope) -> Result<Option<ResponseEnvelope>, PipelineError> + Send + Sync,
{
    ResponseFn {
        name: name.into(),
        on_fulfilled,
        on_rejected: None,
    }
}

impl<F> ResponseFn<F> {
    pub fn on_rejected(mut self, handler: impl Fn(&PipelineError) + Send + Sync + 'static) -> Self {
        self.on_rejected = Some(Box::new(handler));
        self
    }
}

#[async_trait]
impl<F> ResponseInterceptor for ResponseFn<F>
where
    F: Fn(&mut ResponseEnvelope) -> Result<Option<ResponseEnvelope>, PipelineError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_fulfilled(&self, response: &mut ResponseEnvelope) -> Result<Option<ResponseEnvelope>, PipelineError> {
        (self.on_fulfilled)(response)
    }

    async fn on_rejected(&self, error: &PipelineError) {
        if let Some(handler) = &self.on_rejected {
            handler(error);
        }
    }
}

/// Error interceptor built from a closure
pub struct ErrorFn<F> {
    name: String,
    handler: F,
}

pub fn error_fn<F>(name: impl Into<String>, handler: F) -> ErrorFn<F>
where
    F: Fn(&PipelineError) -> Result<(), PipelineError> + Send + Sync,
{
    ErrorFn {
        name: name.into(),
        handler,
    }
}

#[async_trait]
impl<F> ErrorInterceptor for ErrorFn<F>
where
    F: Fn(&PipelineError) -> Result<(), PipelineError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_error(&self, error: &PipelineError) -> Result<(), PipelineError> {
        (self.handler)(error)
    }
}
