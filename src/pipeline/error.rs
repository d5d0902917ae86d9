use thiserror::Error;

use crate::backend::BackendError;

/// Failures raised inside the interceptor pipeline.
///
/// The pipeline hands back exactly the value a handler or the backend produced;
/// it never wraps an error a second time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Request interceptor '{interceptor}' failed: {message}")]
    Request { interceptor: String, message: String },

    #[error("Response interceptor '{interceptor}' failed: {message}")]
    Response { interceptor: String, message: String },

    #[error("Error interceptor '{interceptor}' failed: {message}")]
    Observer { interceptor: String, message: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl PipelineError {
    pub fn request(interceptor: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Request {
            interceptor: interceptor.into(),
            message: message.into(),
        }
    }

    pub fn response(interceptor: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Response {
            interceptor: interceptor.into(),
            message: message.into(),
        }
    }

    pub fn observer(interceptor: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Observer {
            interceptor: interceptor.into(),
            message: message.into(),
        }
    }

    /// Backend error underneath, if the failure came from the backend call
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            PipelineError::Backend(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP-style status of the underlying backend failure
    pub fn status(&self) -> Option<u16> {
        self.backend().and_then(|err| err.status)
    }
}
