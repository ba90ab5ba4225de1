//! Reports
//!
//! Upvote/downvote the plate being viewed. A report is two independent
//! remote writes run side by side: the reputation counter and the user's
//! report log. Neither is rolled back when the other fails.
//!
//! Reports of one session run one at a time. The rate limit reads the
//! user's report history, which is loaded first if no listener has, plus
//! the reports accepted locally that the listeners have not echoed yet.

use std::sync::{Arc, Mutex, PoisonError};

use kernel::id::PlateKey;

use crate::application::cache::{CacheCategory, ReputationCache};
use crate::application::rate_limit::{RateLimitDecision, RateLimitPolicy};
use crate::application::session::SessionContext;
use crate::domain::remote::RemoteDataPort;
use crate::domain::value_objects::{PlateId, PlateIdentity, ReportDirection};
use crate::error::{ReputationError, ReputationResult, bounded};

/// Applied report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReceipt {
    pub plate_key: PlateKey,
    pub direction: ReportDirection,
}

/// Report accepted by this session, not yet seen in the cache
#[derive(Debug, Clone)]
struct AcceptedReport {
    plate: PlateId,
    at_ms: i64,
}

/// Report service
pub struct ReportService<R>
where
    R: RemoteDataPort,
{
    context: Arc<SessionContext<R>>,
    policy: RateLimitPolicy,
    /// Held from the rate-limit check through both writes
    gate: tokio::sync::Mutex<()>,
    accepted: Mutex<Vec<AcceptedReport>>,
}

impl<R> ReportService<R>
where
    R: RemoteDataPort + Sync + 'static,
{
    pub(crate) fn new(context: Arc<SessionContext<R>>) -> Self {
        let policy = RateLimitPolicy::new(
            context.config.rate_limit_window,
            Arc::clone(&context.clock),
        );
        Self {
            context,
            policy,
            gate: tokio::sync::Mutex::new(()),
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Report the viewed plate
    ///
    /// Session and rate-limit checks run before any remote write. When
    /// exactly one of the two writes fails the error is
    /// [`ReputationError::PartialReport`]; the cache is left to the next push.
    pub async fn report(&self, direction: ReportDirection) -> ReputationResult<ReportReceipt> {
        let _gate = self.gate.lock().await;
        let reporter = self.context.state.reporter().await.inspect_err(|e| e.log())?;
        self.ensure_history().await.inspect_err(|e| e.log())?;

        let decision = self.decide(&reporter.plate).await;
        if !decision.allowed {
            let err = ReputationError::RateLimited {
                next_allowed_at_ms: decision.next_allowed_at_ms,
            };
            err.log();
            return Err(err);
        }

        let timeout = self.context.config.operation_timeout;
        let remote = &self.context.remote;
        let (counter, logged) = tokio::join!(
            bounded(
                timeout,
                remote.increment_reputation(&reporter.plate_key, direction)
            ),
            bounded(
                timeout,
                remote.log_report(&reporter.plate_key, &reporter.user_id, direction)
            ),
        );

        if counter.is_ok() || logged.is_ok() {
            self.remember(reporter.plate.clone());
        }

        let outcome = match (counter, logged) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Err(_)) => Err(e),
            (Ok(()), Err(e)) => Err(ReputationError::PartialReport {
                counter_applied: true,
                logged: false,
                cause: e.kind(),
            }),
            (Err(e), Ok(())) => Err(ReputationError::PartialReport {
                counter_applied: false,
                logged: true,
                cause: e.kind(),
            }),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    plate_key = %reporter.plate_key,
                    user_id = %reporter.user_id,
                    direction = %direction,
                    "Report applied"
                );
                Ok(ReportReceipt {
                    plate_key: reporter.plate_key,
                    direction,
                })
            }
            Err(e) => {
                e.log();
                Err(e)
            }
        }
    }

    /// Re-issue only the report-log write of a partial report
    pub async fn retry_report_log(&self, direction: ReportDirection) -> ReputationResult<()> {
        let reporter = self.context.state.reporter().await.inspect_err(|e| e.log())?;
        bounded(
            self.context.config.operation_timeout,
            self.context
                .remote
                .log_report(&reporter.plate_key, &reporter.user_id, direction),
        )
        .await
        .inspect_err(|e| e.log())?;
        tracing::info!(
            plate_key = %reporter.plate_key,
            direction = %direction,
            "Report log rewritten"
        );
        Ok(())
    }

    /// Claim the viewed plate for the signed-in user
    pub async fn register_owner(&self) -> ReputationResult<()> {
        let reporter = self.context.state.reporter().await.inspect_err(|e| e.log())?;
        bounded(
            self.context.config.operation_timeout,
            self.context
                .remote
                .register_owner(&reporter.plate_key, &reporter.user_id),
        )
        .await
        .inspect_err(|e| e.log())?;
        tracing::info!(
            plate_key = %reporter.plate_key,
            user_id = %reporter.user_id,
            "Plate owner registered"
        );
        Ok(())
    }

    pub async fn latest_report_timestamp(&self, plate: &impl PlateIdentity) -> i64 {
        let cache = self.context.cache.read().await;
        self.latest(&cache, plate)
    }

    /// Whether the session may report `plate` now
    ///
    /// Only a signed-in, non-anonymous user may report.
    pub async fn is_report_allowed(&self, plate: &impl PlateIdentity) -> bool {
        if self.context.state.full_user().await.is_err() {
            return false;
        }
        self.decide(plate).await.allowed
    }

    pub async fn next_report_at(&self, plate: &impl PlateIdentity) -> i64 {
        self.decide(plate).await.next_allowed_at_ms
    }

    /// Load the report history unless a listener already has
    async fn ensure_history(&self) -> ReputationResult<()> {
        let loaded = {
            let cache = self.context.cache.read().await;
            cache.is_loaded(CacheCategory::Upvoted) && cache.is_loaded(CacheCategory::Downvoted)
        };
        if loaded {
            return Ok(());
        }
        tracing::debug!("Loading report history before reporting");
        self.context.start_user_listeners().await
    }

    async fn decide(&self, plate: &impl PlateIdentity) -> RateLimitDecision {
        let cache = self.context.cache.read().await;
        self.policy.decide(self.latest(&cache, plate), false)
    }

    /// Latest report time from the cache or the locally accepted reports
    fn latest(&self, cache: &ReputationCache, plate: &impl PlateIdentity) -> i64 {
        let cached = self.policy.latest_report_timestamp(cache, plate);
        let expired_before = self
            .context
            .clock
            .now_ms()
            .saturating_sub(self.policy.window().as_millis() as i64);

        let mut accepted = self.accepted.lock().unwrap_or_else(PoisonError::into_inner);
        // Confirmed by the cache or outside the window: no longer needed
        accepted.retain(|report| {
            let confirmed = report.plate.same_plate(plate) && report.at_ms <= cached;
            report.at_ms > expired_before && !confirmed
        });
        accepted
            .iter()
            .filter(|report| report.plate.same_plate(plate))
            .map(|report| report.at_ms)
            .fold(cached, i64::max)
    }

    fn remember(&self, plate: PlateId) {
        let at_ms = self.context.clock.now_ms();
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AcceptedReport { plate, at_ms });
    }
}
