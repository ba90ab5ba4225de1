//! Reputation Error Types
//!
//! This module provides reputation-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use std::future::Future;
use std::time::Duration;

use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::deadline::{DeadlineError, with_deadline};
use thiserror::Error;

/// Reputation-specific result type alias
pub type ReputationResult<T> = Result<T, ReputationError>;

/// Reputation-specific error variants
#[derive(Debug, Error)]
pub enum ReputationError {
    /// Remote store unreachable or device offline
    #[error("Network failure: {0}")]
    Network(String),

    /// Remote call exceeded its deadline
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// Mutating operation attempted by an anonymous user
    #[error("Anonymous users cannot perform this operation")]
    AnonymousUser,

    /// No user is signed in
    #[error("No user is signed in")]
    Unauthenticated,

    /// Report or ownership claim without a plate being viewed
    #[error("No plate is selected")]
    NoPlateSelected,

    /// Plate reported too recently by this user
    #[error("Plate was reported recently; next report allowed at {next_allowed_at_ms}")]
    RateLimited { next_allowed_at_ms: i64 },

    /// Prefix or number fails validation
    #[error("Invalid plate: {0}")]
    InvalidPlate(String),

    /// Plate key does not exist in the store
    #[error("Plate not found: {0}")]
    PlateNotFound(kernel::id::PlateKey),

    /// Remote key fails validation
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] kernel::id::KeyError),

    /// Exactly one of the two report writes landed
    #[error(
        "Report partially applied (counter applied: {counter_applied}, logged: {logged}): {cause}"
    )]
    PartialReport {
        counter_applied: bool,
        logged: bool,
        cause: ErrorKind,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReputationError {
    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReputationError::Network(_) => ErrorKind::NetworkFailure,
            ReputationError::Timeout(_) => ErrorKind::TimeoutFailure,
            ReputationError::AnonymousUser => ErrorKind::AnonymousUserRestricted,
            ReputationError::Unauthenticated => ErrorKind::Unauthenticated,
            ReputationError::NoPlateSelected => ErrorKind::NoPlateSelected,
            ReputationError::RateLimited { .. } => ErrorKind::RateLimited,
            ReputationError::InvalidPlate(_) | ReputationError::InvalidKey(_) => {
                ErrorKind::InvalidInput
            }
            ReputationError::PlateNotFound(_) => ErrorKind::NotFound,
            ReputationError::PartialReport { cause, .. } => *cause,
            ReputationError::Http(e) => http_kind(e),
            ReputationError::Decode(_) | ReputationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the operation may succeed when retried
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Log the error with appropriate level
    pub(crate) fn log(&self) {
        match self {
            ReputationError::Http(e) if self.is_transient() => {
                tracing::warn!(error = %e, "Remote store unavailable");
            }
            ReputationError::Http(e) => {
                tracing::error!(error = %e, "Remote store HTTP error");
            }
            ReputationError::Decode(e) => {
                tracing::error!(error = %e, "Remote payload decode error");
            }
            ReputationError::Internal(msg) => {
                tracing::error!(message = %msg, "Reputation internal error");
            }
            ReputationError::PartialReport {
                counter_applied,
                logged,
                cause,
            } => {
                tracing::warn!(
                    counter_applied,
                    logged,
                    cause = %cause,
                    "Report partially applied"
                );
            }
            ReputationError::Network(_) | ReputationError::Timeout(_) => {
                tracing::warn!(error = %self, "Remote call failed");
            }
            ReputationError::RateLimited { next_allowed_at_ms } => {
                tracing::info!(next_allowed_at_ms, "Report rejected by rate limit");
            }
            _ => {
                tracing::debug!(error = %self, "Reputation error");
            }
        }
    }
}

/// Transport failures and gateway statuses are connection-level for the caller
fn http_kind(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        return ErrorKind::TimeoutFailure;
    }
    if let Some(status) = err.status() {
        return match status.as_u16() {
            401 | 403 => ErrorKind::Unauthenticated,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::TimeoutFailure,
            429 | 502 | 503 | 504 => ErrorKind::NetworkFailure,
            _ => ErrorKind::Internal,
        };
    }
    if err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::NetworkFailure
    } else {
        ErrorKind::Internal
    }
}

impl From<ReputationError> for AppError {
    fn from(err: ReputationError) -> Self {
        let action = match &err {
            ReputationError::PartialReport { logged: false, .. } => {
                Some("Retry logging the report")
            }
            ReputationError::RateLimited { .. } => Some("Try again later"),
            _ => None,
        };
        let mut app = AppError::new(err.kind(), err.to_string());
        if let Some(action) = action {
            app = app.with_action(action);
        }
        app.with_source(err)
    }
}

/// Run a remote call under a deadline
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> ReputationResult<T>
where
    F: Future<Output = ReputationResult<T>>,
{
    match with_deadline(timeout, call).await {
        Ok(value) => Ok(value),
        Err(DeadlineError::Elapsed(after)) => Err(ReputationError::Timeout(after)),
        Err(DeadlineError::Failed(err)) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ReputationError::AnonymousUser.kind(),
            ErrorKind::AnonymousUserRestricted
        );
        assert_eq!(
            ReputationError::Timeout(Duration::from_secs(10)).kind(),
            ErrorKind::TimeoutFailure
        );
        assert_eq!(
            ReputationError::InvalidPlate("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            ReputationError::RateLimited { next_allowed_at_ms: 1 }.kind(),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn test_partial_report_carries_cause() {
        let err = ReputationError::PartialReport {
            counter_applied: true,
            logged: false,
            cause: ErrorKind::TimeoutFailure,
        };
        assert_eq!(err.kind(), ErrorKind::TimeoutFailure);

        let app: AppError = err.into();
        assert_eq!(app.code(), "TIMEOUT_FAILURE");
        assert_eq!(app.action(), Some("Retry logging the report"));
        assert!(std::error::Error::source(&app).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_maps_elapsed() {
        let result: ReputationResult<()> = bounded(Duration::from_secs(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ReputationError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_failure_through() {
        let result: ReputationResult<()> = bounded(Duration::from_secs(10), async {
            Err(ReputationError::Network("down".into()))
        })
        .await;
        assert!(matches!(result, Err(ReputationError::Network(_))));
    }
}
