//! Identity Error Types
//!
//! Provider failures, mapped onto the unified `kernel::error::AppError`
//! taxonomy so the UI layer sees one set of codes.

use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Identity-specific result type alias
pub type AuthResult<T> = Result<T, AuthFailure>;

/// Failures reported by an identity provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// Provider unreachable or connection lost mid-call
    #[error("Identity provider unreachable")]
    Network,

    /// Deadline exceeded
    #[error("Identity provider did not answer in time")]
    Timeout,

    /// Wrong email/password pair or malformed credentials
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No account for this email
    #[error("User does not exist")]
    UserNonExistent,

    /// Account already registered for this email
    #[error("User already exists")]
    UserAlreadyExists,

    /// Password rejected by the provider's strength policy
    #[error("Password is too weak")]
    WeakPassword,

    /// Input that fails local format checks
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Anything else the provider reports
    #[error("Identity provider error: {0}")]
    Provider(String),
}

impl AuthFailure {
    /// Get the ErrorKind for this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthFailure::Network => ErrorKind::NetworkFailure,
            AuthFailure::Timeout => ErrorKind::TimeoutFailure,
            AuthFailure::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthFailure::UserNonExistent => ErrorKind::UserNonExistent,
            AuthFailure::UserAlreadyExists => ErrorKind::UserAlreadyExists,
            AuthFailure::WeakPassword => ErrorKind::WeakPassword,
            AuthFailure::InvalidInput(_) => ErrorKind::InvalidInput,
            AuthFailure::Provider(_) => ErrorKind::Internal,
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        AppError::new(self.kind(), self.to_string()).with_source(self.clone())
    }

    /// Log the failure with appropriate level
    pub(crate) fn log(&self) {
        match self {
            AuthFailure::Provider(msg) => {
                tracing::error!(message = %msg, "Identity provider error");
            }
            AuthFailure::Network | AuthFailure::Timeout => {
                tracing::warn!(error = %self, "Identity provider call failed");
            }
            AuthFailure::InvalidCredentials => {
                tracing::warn!("Invalid sign in attempt");
            }
            _ => {
                tracing::debug!(error = %self, "Identity failure");
            }
        }
    }
}

impl From<AuthFailure> for AppError {
    fn from(err: AuthFailure) -> Self {
        err.to_app_error()
    }
}
