//! Session Context
//!
//! A `Session` exists from login to sign-out. It owns the session state,
//! the cache mirror and the listener manager, and hands out the lookup and
//! report services bound to them. Signing out consumes the session.

use std::sync::Arc;

use kernel::id::{PlateKey, UserId};
use kernel::signal::Signal;
use platform::clock::Clock;
use platform::connectivity::Connectivity;
use tokio::sync::{Mutex, mpsc};

use crate::application::cache::SharedCache;
use crate::application::config::ReputationConfig;
use crate::application::listeners::{ListenerKind, ListenerLifecycleManager, UserChannel};
use crate::application::plate_lookup::{PlateFeed, PlateLookupService};
use crate::application::reports::{ReportReceipt, ReportService};
use crate::domain::entities::Plate;
use crate::domain::remote::RemoteDataPort;
use crate::domain::value_objects::{PlateId, PlateIdentity, ReportDirection};
use crate::error::{ReputationError, ReputationResult, bounded};

/// Receiver side of a one-shot session sequence
pub type SessionSignals = mpsc::Receiver<Signal<()>>;

/// Who is signed in and which plate is being viewed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: Option<UserId>,
    pub is_anonymous: bool,
    pub current_plate_key: Option<PlateKey>,
}

/// Everything a report needs from the session
#[derive(Debug, Clone)]
pub(crate) struct Reporter {
    pub user_id: UserId,
    pub plate_key: PlateKey,
    pub plate: PlateId,
}

#[derive(Debug, Default)]
struct StateInner {
    state: SessionState,
    current_plate: Option<PlateId>,
    /// Bumped whenever the bound plate is released
    plate_epoch: u64,
}

/// Shared session state cell
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell {
    inner: Arc<Mutex<StateInner>>,
}

impl StateCell {
    fn new(user_id: Option<UserId>, is_anonymous: bool) -> Self {
        let inner = StateInner {
            state: SessionState {
                user_id,
                is_anonymous,
                current_plate_key: None,
            },
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    /// Signed-in, non-anonymous user
    pub async fn full_user(&self) -> ReputationResult<UserId> {
        let inner = self.inner.lock().await;
        if inner.state.is_anonymous {
            return Err(ReputationError::AnonymousUser);
        }
        inner
            .state
            .user_id
            .clone()
            .ok_or(ReputationError::Unauthenticated)
    }

    /// Full user plus the plate being viewed
    pub async fn reporter(&self) -> ReputationResult<Reporter> {
        let inner = self.inner.lock().await;
        if inner.state.is_anonymous {
            return Err(ReputationError::AnonymousUser);
        }
        let user_id = inner
            .state
            .user_id
            .clone()
            .ok_or(ReputationError::Unauthenticated)?;
        match (&inner.state.current_plate_key, &inner.current_plate) {
            (Some(plate_key), Some(plate)) => Ok(Reporter {
                user_id,
                plate_key: plate_key.clone(),
                plate: plate.clone(),
            }),
            _ => Err(ReputationError::NoPlateSelected),
        }
    }

    pub async fn is_anonymous(&self) -> bool {
        self.inner.lock().await.state.is_anonymous
    }

    pub async fn plate_epoch(&self) -> u64 {
        self.inner.lock().await.plate_epoch
    }

    /// Bind the viewed plate unless it was released since `epoch`
    pub async fn bind_plate(&self, epoch: u64, plate_key: PlateKey, plate: PlateId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.plate_epoch != epoch {
            return false;
        }
        inner.state.current_plate_key = Some(plate_key);
        inner.current_plate = Some(plate);
        true
    }

    /// Unbind the plate of the lookup started at `epoch`
    ///
    /// Returns false when a later lookup or a release already moved on.
    pub async fn end_lookup(&self, epoch: u64) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.plate_epoch != epoch {
            return false;
        }
        inner.state.current_plate_key = None;
        inner.current_plate = None;
        inner.plate_epoch += 1;
        true
    }

    pub async fn unbind_plate(&self) {
        let mut inner = self.inner.lock().await;
        inner.state.current_plate_key = None;
        inner.current_plate = None;
        inner.plate_epoch += 1;
    }

    async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let epoch = inner.plate_epoch + 1;
        *inner = StateInner {
            plate_epoch: epoch,
            ..Default::default()
        };
    }
}

/// Session-scoped collaborators
pub(crate) struct SessionContext<R>
where
    R: RemoteDataPort,
{
    pub remote: Arc<R>,
    pub config: Arc<ReputationConfig>,
    pub clock: Arc<dyn Clock>,
    pub cache: SharedCache,
    pub listeners: ListenerLifecycleManager<R>,
    pub state: StateCell,
}

impl<R> SessionContext<R>
where
    R: RemoteDataPort + Sync + 'static,
{
    fn new(
        remote: Arc<R>,
        config: Arc<ReputationConfig>,
        clock: Arc<dyn Clock>,
        state: StateCell,
    ) -> Self {
        let cache = SharedCache::new();
        let listeners = ListenerLifecycleManager::new(
            Arc::clone(&remote),
            cache.clone(),
            config.operation_timeout,
        );
        Self {
            remote,
            config,
            clock,
            cache,
            listeners,
            state,
        }
    }

    /// Activate the user channels and wait until each category is hydrated
    pub(crate) async fn start_user_listeners(&self) -> ReputationResult<()> {
        let user_id = self.state.full_user().await?;
        bounded(self.config.operation_timeout, async {
            let mut revisions = self.cache.subscribe();
            for channel in UserChannel::ALL {
                self.listeners.activate(channel, &user_id).await?;
            }
            while !self.cache.read().await.is_fully_loaded() {
                revisions
                    .changed()
                    .await
                    .map_err(|_| ReputationError::Internal("cache revision channel closed".into()))?;
            }
            Ok::<(), ReputationError>(())
        })
        .await
    }
}

/// Signed-in session
pub struct Session<R, C>
where
    R: RemoteDataPort,
    C: Connectivity,
{
    context: Arc<SessionContext<R>>,
    lookup: PlateLookupService<R, C>,
    reports: ReportService<R>,
}

impl<R, C> Session<R, C>
where
    R: RemoteDataPort + Sync + 'static,
    C: Connectivity + Sync + 'static,
{
    pub(crate) fn open(
        remote: Arc<R>,
        connectivity: Arc<C>,
        config: Arc<ReputationConfig>,
        clock: Arc<dyn Clock>,
        user_id: Option<UserId>,
        is_anonymous: bool,
    ) -> Self {
        let state = StateCell::new(user_id, is_anonymous);
        let context = Arc::new(SessionContext::new(remote, config, clock, state));
        let lookup = PlateLookupService::new(Arc::clone(&context), connectivity);
        let reports = ReportService::new(Arc::clone(&context));
        Self {
            context,
            lookup,
            reports,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.context.state.snapshot().await
    }

    pub fn lookup(&self) -> &PlateLookupService<R, C> {
        &self.lookup
    }

    pub fn reports(&self) -> &ReportService<R> {
        &self.reports
    }

    pub fn cache(&self) -> &SharedCache {
        &self.context.cache
    }

    /// Owner id for device-local recent searches
    pub async fn recent_owner(&self) -> String {
        let state = self.context.state.snapshot().await;
        match state.user_id {
            Some(user_id) if !state.is_anonymous => user_id.into_string(),
            _ => self.context.config.anonymous_id.clone(),
        }
    }

    /// Start the ownership, upvote and downvote listeners
    ///
    /// Emits `Loading`, then `Success` once each category has been hydrated
    /// at least once, or an error.
    pub fn start_user_listeners(&self) -> SessionSignals {
        let (tx, rx) = mpsc::channel(self.context.config.channel_capacity());
        let context = Arc::clone(&self.context);

        tokio::spawn(async move {
            if tx.send(Signal::Loading).await.is_err() {
                return;
            }
            let signal = match context.start_user_listeners().await {
                Ok(()) => {
                    tracing::info!("User listeners ready");
                    Signal::Success(())
                }
                Err(e) => {
                    e.log();
                    Signal::Error(e.into())
                }
            };
            let _ = tx.send(signal).await;
        });

        rx
    }

    // ========================================================================
    // Plate lookup
    // ========================================================================

    pub async fn find_or_create(&self, prefix: &str, number: &str) -> PlateFeed {
        self.lookup.find_or_create(prefix, number).await
    }

    pub async fn release_plate(&self) {
        self.lookup.release().await;
    }

    // ========================================================================
    // Reports
    // ========================================================================

    pub async fn report(&self, direction: ReportDirection) -> ReputationResult<ReportReceipt> {
        self.reports.report(direction).await
    }

    pub async fn retry_report_log(&self, direction: ReportDirection) -> ReputationResult<()> {
        self.reports.retry_report_log(direction).await
    }

    pub async fn register_owner(&self) -> ReputationResult<()> {
        self.reports.register_owner().await
    }

    pub async fn is_report_allowed(&self, plate: &impl PlateIdentity) -> bool {
        self.reports.is_report_allowed(plate).await
    }

    pub async fn latest_report_timestamp(&self, plate: &impl PlateIdentity) -> i64 {
        self.reports.latest_report_timestamp(plate).await
    }

    // ========================================================================
    // Cached lists
    // ========================================================================

    pub async fn is_plate_owned(&self, plate: &impl PlateIdentity) -> bool {
        self.context.cache.read().await.is_plate_owned(plate)
    }

    pub async fn owned_plates(&self) -> Vec<Plate> {
        self.context.cache.read().await.owned_plates()
    }

    pub async fn upvoted_plates(&self) -> Vec<Plate> {
        self.context.cache.read().await.upvoted_plates()
    }

    pub async fn downvoted_plates(&self) -> Vec<Plate> {
        self.context.cache.read().await.downvoted_plates()
    }

    // ========================================================================
    // Listener control
    // ========================================================================

    pub async fn is_listener_active(&self, kind: ListenerKind) -> bool {
        self.context.listeners.is_active(kind).await
    }

    /// Detach one listener and empty its cache category
    ///
    /// `start_user_listeners` reactivates the user channels. Detaching the
    /// plate channel also unbinds the current plate.
    pub async fn deactivate_listener(&self, kind: ListenerKind) -> bool {
        let detached = self.context.listeners.deactivate(kind).await;
        if kind == ListenerKind::Plate {
            self.lookup.release().await;
        }
        detached
    }

    /// Tear the session down
    ///
    /// Every listener is detached and the cache emptied before this returns.
    pub async fn sign_out(self) {
        self.context.listeners.deactivate_all().await;
        self.lookup.reset_state();
        self.context.cache.clear_all().await;
        self.context.state.reset().await;
        tracing::info!("Session signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::parse("user-1").unwrap()
    }

    fn key() -> PlateKey {
        PlateKey::parse("k1").unwrap()
    }

    fn plate() -> PlateId {
        PlateId::parse("ABC", "1").unwrap()
    }

    #[tokio::test]
    async fn test_reporter_check_order() {
        let anonymous = StateCell::new(None, true);
        assert!(matches!(
            anonymous.reporter().await,
            Err(ReputationError::AnonymousUser)
        ));

        let nobody = StateCell::new(None, false);
        assert!(matches!(
            nobody.reporter().await,
            Err(ReputationError::Unauthenticated)
        ));

        let signed_in = StateCell::new(Some(user()), false);
        assert!(matches!(
            signed_in.reporter().await,
            Err(ReputationError::NoPlateSelected)
        ));

        let epoch = signed_in.plate_epoch().await;
        assert!(signed_in.bind_plate(epoch, key(), plate()).await);
        let reporter = signed_in.reporter().await.unwrap();
        assert_eq!(reporter.plate_key, key());
    }

    #[tokio::test]
    async fn test_stale_binding_refused() {
        let cell = StateCell::new(Some(user()), false);
        let epoch = cell.plate_epoch().await;
        cell.unbind_plate().await;

        assert!(!cell.bind_plate(epoch, key(), plate()).await);
        assert_eq!(cell.snapshot().await.current_plate_key, None);
    }

    #[tokio::test]
    async fn test_end_lookup_only_unbinds_its_own_epoch() {
        let cell = StateCell::new(Some(user()), false);
        let stale = cell.plate_epoch().await;
        cell.unbind_plate().await;
        let epoch = cell.plate_epoch().await;
        assert!(cell.bind_plate(epoch, key(), plate()).await);

        assert!(!cell.end_lookup(stale).await);
        assert_eq!(cell.snapshot().await.current_plate_key, Some(key()));

        assert!(cell.end_lookup(epoch).await);
        assert_eq!(cell.snapshot().await.current_plate_key, None);
        assert!(!cell.end_lookup(epoch).await);
    }

    #[tokio::test]
    async fn test_reset_clears_user_and_plate() {
        let cell = StateCell::new(Some(user()), false);
        let epoch = cell.plate_epoch().await;
        cell.bind_plate(epoch, key(), plate()).await;

        cell.reset().await;

        assert_eq!(cell.snapshot().await, SessionState::default());
        assert!(cell.plate_epoch().await > epoch);
    }
}
