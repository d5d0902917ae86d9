// Session-level error types
use thiserror::Error;

use crate::backend::BackendError;
use crate::pipeline::PipelineError;

/// Credential, registration and password-reset failures.
///
/// Known backend messages are mapped to user-facing text; anything else is
/// kept verbatim in [`AuthError::Backend`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid email or password. Please try again.")]
    InvalidCredentials,

    #[error("This email is already registered. Please sign in instead.")]
    AlreadyRegistered,

    #[error("No account found with this email address.")]
    UserNotFound,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Map `error` to `known` when its message contains `needle`
    pub(crate) fn translate(error: BackendError, needle: &str, known: AuthError) -> Self {
        if error.message.contains(needle) {
            known
        } else {
            AuthError::Backend(error)
        }
    }

    /// Stable code for clients
    pub fn error_code(&self) -> &str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AlreadyRegistered => "ALREADY_REGISTERED",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Backend(err) => err.code.as_deref().unwrap_or("BACKEND_ERROR"),
        }
    }
}

/// Errors from session operations that touch stored data
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl SessionError {
    pub fn error_code(&self) -> &str {
        match self {
            SessionError::Auth(err) => err.error_code(),
            SessionError::NotAuthenticated => "NOT_AUTHENTICATED",
            SessionError::Pipeline(_) => "PIPELINE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_known_message() {
        let err = AuthError::translate(
            BackendError::new("Invalid login credentials"),
            "Invalid login credentials",
            AuthError::InvalidCredentials,
        );
        assert_eq!(err.to_string(), "Invalid email or password. Please try again.");
    }

    #[test]
    fn test_translate_keeps_unknown_message_verbatim() {
        let err = AuthError::translate(
            BackendError::new("Email rate limit exceeded").with_status(429),
            "Invalid login credentials",
            AuthError::InvalidCredentials,
        );
        assert_eq!(err.to_string(), "Email rate limit exceeded");
        assert!(matches!(err, AuthError::Backend(ref e) if e.status == Some(429)));
    }

    #[test]
    fn test_not_authenticated_message() {
        assert_eq!(SessionError::NotAuthenticated.to_string(), "Not authenticated");
    }
}
