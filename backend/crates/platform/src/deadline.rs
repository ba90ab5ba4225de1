//! Deadlines for one-shot operations
//!
//! A one-shot remote call is raced against a fixed deadline; losing the race
//! is reported as [`DeadlineError::Elapsed`], which callers map to their own
//! timeout failure, kept distinct from connectivity failures.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Default deadline for one-shot operations
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

/// Outcome of a deadline race
#[derive(Debug, Error)]
pub enum DeadlineError<E> {
    /// The deadline elapsed before the operation finished
    #[error("operation did not complete within {0:?}")]
    Elapsed(Duration),

    /// The operation finished in time but failed
    #[error(transparent)]
    Failed(E),
}

/// Run `fut` with a deadline
pub async fn with_deadline<T, E, F>(deadline: Duration, fut: F) -> Result<T, DeadlineError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DeadlineError::Failed(e)),
        Err(_) => Err(DeadlineError::Elapsed(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_in_time() {
        let result: Result<u8, DeadlineError<()>> =
            with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failure_is_passed_through() {
        let result: Result<u8, DeadlineError<&str>> =
            with_deadline(Duration::from_secs(1), async { Err("boom") }).await;
        assert!(matches!(result, Err(DeadlineError::Failed("boom"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed() {
        let result: Result<u8, DeadlineError<()>> = with_deadline(Duration::from_secs(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(DeadlineError::Elapsed(d)) if d == Duration::from_secs(10)));
    }
}
