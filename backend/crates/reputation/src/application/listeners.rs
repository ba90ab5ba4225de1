//! Listener Lifecycle
//!
//! Owns the four remote listeners of a session: the plate collection and
//! the user's upvote, downvote and ownership sub-trees. Each channel is
//! either inactive or holds its subscription handle together with the task
//! consuming it.
//!
//! ## Invariants
//! - At most one subscription per channel; activating an active channel is a no-op
//! - Deactivation detaches the remote listener before returning, then stops
//!   the consuming task and clears the channel's cache category
//! - A consuming task only writes the cache under the generation it started with
//! - A consuming task that ends on its own retires its channel, unless the
//!   channel was re-activated in the meantime

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use kernel::id::{PlateKey, UserId};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::application::cache::{CacheCategory, SharedCache};
use crate::domain::entities::{OwnedSnapshot, PlateCollection, ReportSnapshot};
use crate::domain::remote::{RemoteDataPort, SubscriptionHandle};
use crate::domain::services::hydrate_reports;
use crate::domain::value_objects::ReportDirection;
use crate::error::{ReputationResult, bounded};

/// Listener channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Plate,
    Upvote,
    Downvote,
    Ownership,
}

impl ListenerKind {
    pub const ALL: [ListenerKind; 4] = [
        ListenerKind::Plate,
        ListenerKind::Upvote,
        ListenerKind::Downvote,
        ListenerKind::Ownership,
    ];

    const fn index(self) -> usize {
        match self {
            ListenerKind::Plate => 0,
            ListenerKind::Upvote => 1,
            ListenerKind::Downvote => 2,
            ListenerKind::Ownership => 3,
        }
    }

    /// Cache category fed by this channel
    pub const fn category(self) -> Option<CacheCategory> {
        match self {
            ListenerKind::Plate => None,
            ListenerKind::Upvote => Some(CacheCategory::Upvoted),
            ListenerKind::Downvote => Some(CacheCategory::Downvoted),
            ListenerKind::Ownership => Some(CacheCategory::Owned),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ListenerKind::Plate => "plate",
            ListenerKind::Upvote => "upvote",
            ListenerKind::Downvote => "downvote",
            ListenerKind::Ownership => "ownership",
        }
    }
}

/// User-scoped channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserChannel {
    Upvote,
    Downvote,
    Ownership,
}

impl UserChannel {
    pub const ALL: [UserChannel; 3] = [
        UserChannel::Ownership,
        UserChannel::Upvote,
        UserChannel::Downvote,
    ];

    pub const fn kind(self) -> ListenerKind {
        match self {
            UserChannel::Upvote => ListenerKind::Upvote,
            UserChannel::Downvote => ListenerKind::Downvote,
            UserChannel::Ownership => ListenerKind::Ownership,
        }
    }
}

/// Result of an activation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated,
    AlreadyActive,
}

struct ActiveListener {
    serial: u64,
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl ActiveListener {
    fn stop(self) {
        self.handle.cancel();
        self.task.abort();
    }
}

enum ListenerState {
    Inactive,
    Active(ActiveListener),
}

impl ListenerState {
    fn is_active(&self) -> bool {
        matches!(self, ListenerState::Active(_))
    }

    fn holds(&self, serial: u64) -> bool {
        matches!(self, ListenerState::Active(active) if active.serial == serial)
    }
}

type Channels = [ListenerState; 4];

/// Listener lifecycle manager
pub struct ListenerLifecycleManager<R>
where
    R: RemoteDataPort,
{
    remote: Arc<R>,
    cache: SharedCache,
    lookup_timeout: Duration,
    channels: Arc<Mutex<Channels>>,
    serial: AtomicU64,
}

impl<R> ListenerLifecycleManager<R>
where
    R: RemoteDataPort + Sync + 'static,
{
    pub fn new(remote: Arc<R>, cache: SharedCache, lookup_timeout: Duration) -> Self {
        Self {
            remote,
            cache,
            lookup_timeout,
            channels: Arc::new(Mutex::new([
                ListenerState::Inactive,
                ListenerState::Inactive,
                ListenerState::Inactive,
                ListenerState::Inactive,
            ])),
            serial: AtomicU64::new(0),
        }
    }

    /// Spawn a channel's consuming task
    ///
    /// Called with the channel lock held, so the task cannot retire before
    /// its slot is filled.
    fn spawn_consumer<Fut>(&self, kind: ListenerKind, serial: u64, consumer: Fut) -> JoinHandle<()>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let channels = Arc::downgrade(&self.channels);
        let cache = self.cache.clone();
        tokio::spawn(async move {
            consumer.await;
            retire(channels, cache, kind, serial).await;
        })
    }

    pub async fn is_active(&self, kind: ListenerKind) -> bool {
        self.channels.lock().await[kind.index()].is_active()
    }

    /// Start a user-scoped channel feeding the cache
    pub async fn activate(
        &self,
        channel: UserChannel,
        user_id: &UserId,
    ) -> ReputationResult<Activation> {
        let kind = channel.kind();
        let mut channels = self.channels.lock().await;
        if channels[kind.index()].is_active() {
            tracing::debug!(listener = kind.as_str(), "Listener already active");
            return Ok(Activation::AlreadyActive);
        }

        let remote = Arc::clone(&self.remote);
        let cache = self.cache.clone();
        let lookup_timeout = self.lookup_timeout;
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);

        let active = match channel {
            UserChannel::Ownership => {
                let generation = cache.generation(CacheCategory::Owned).await;
                let (rx, handle) = remote.watch_owned(user_id).await?.into_parts();
                let task = self.spawn_consumer(
                    kind,
                    serial,
                    pump_owned(remote, cache, generation, lookup_timeout, rx),
                );
                ActiveListener {
                    serial,
                    handle,
                    task,
                }
            }
            UserChannel::Upvote | UserChannel::Downvote => {
                let direction = if channel == UserChannel::Upvote {
                    ReportDirection::Upvote
                } else {
                    ReportDirection::Downvote
                };
                let generation = cache.generation(CacheCategory::from(direction)).await;
                let (rx, handle) = remote
                    .watch_reports(user_id, direction)
                    .await?
                    .into_parts();
                let task = self.spawn_consumer(
                    kind,
                    serial,
                    pump_reports(remote, cache, direction, generation, lookup_timeout, rx),
                );
                ActiveListener {
                    serial,
                    handle,
                    task,
                }
            }
        };

        channels[kind.index()] = ListenerState::Active(active);
        tracing::info!(listener = kind.as_str(), user_id = %user_id, "Listener activated");
        Ok(Activation::Activated)
    }

    /// Start the plate channel, handing its snapshots to `consume`
    pub async fn activate_plate<F, Fut>(&self, consume: F) -> ReputationResult<Activation>
    where
        F: FnOnce(mpsc::UnboundedReceiver<PlateCollection>) -> Fut + Send,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut channels = self.channels.lock().await;
        if channels[ListenerKind::Plate.index()].is_active() {
            tracing::debug!(listener = "plate", "Listener already active");
            return Ok(Activation::AlreadyActive);
        }

        let (rx, handle) = self.remote.watch_plates().await?.into_parts();
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let task = self.spawn_consumer(ListenerKind::Plate, serial, consume(rx));
        channels[ListenerKind::Plate.index()] = ListenerState::Active(ActiveListener {
            serial,
            handle,
            task,
        });
        tracing::info!(listener = "plate", "Listener activated");
        Ok(Activation::Activated)
    }

    /// Stop a channel; returns whether it was active
    pub async fn deactivate(&self, kind: ListenerKind) -> bool {
        // Held until the cache is cleared so a re-activation reads the new generation
        let mut channels = self.channels.lock().await;
        let previous = std::mem::replace(&mut channels[kind.index()], ListenerState::Inactive);
        let ListenerState::Active(active) = previous else {
            return false;
        };
        active.stop();
        if let Some(category) = kind.category() {
            self.cache.clear(category).await;
        }
        tracing::info!(listener = kind.as_str(), "Listener deactivated");
        true
    }

    pub async fn deactivate_all(&self) {
        for kind in ListenerKind::ALL {
            self.deactivate(kind).await;
        }
    }
}

// ============================================================================
// Consuming tasks
// ============================================================================

/// Return a channel whose task ended by itself to `Inactive`
async fn retire(
    channels: Weak<Mutex<Channels>>,
    cache: SharedCache,
    kind: ListenerKind,
    serial: u64,
) {
    let Some(channels) = channels.upgrade() else {
        return;
    };
    let mut slots = channels.lock().await;
    let slot = &mut slots[kind.index()];
    if !slot.holds(serial) {
        return;
    }
    if let ListenerState::Active(active) = std::mem::replace(slot, ListenerState::Inactive) {
        // The task being retired is this one; only detach
        active.handle.cancel();
    }
    if let Some(category) = kind.category() {
        cache.clear(category).await;
    }
    tracing::info!(listener = kind.as_str(), "Listener ended");
}

async fn pump_reports<R>(
    remote: Arc<R>,
    cache: SharedCache,
    direction: ReportDirection,
    generation: u64,
    lookup_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<ReportSnapshot>,
) where
    R: RemoteDataPort + Sync,
{
    while let Some(snapshot) = rx.recv().await {
        let keys: Vec<PlateKey> = snapshot.keys().cloned().collect();
        let plates = match bounded(lookup_timeout, remote.lookup_plates_by_keys(&keys)).await {
            Ok(plates) => plates,
            Err(e) => {
                tracing::debug!(direction = %direction, error = %e, "Report refill dropped");
                continue;
            }
        };
        let entries = hydrate_reports(&snapshot, plates);
        let count = entries.len();
        if !cache.replace_reports(direction, generation, entries).await {
            break;
        }
        tracing::debug!(direction = %direction, count, "Report cache refilled");
    }
}

async fn pump_owned<R>(
    remote: Arc<R>,
    cache: SharedCache,
    generation: u64,
    lookup_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<OwnedSnapshot>,
) where
    R: RemoteDataPort + Sync,
{
    while let Some(keys) = rx.recv().await {
        let plates = match bounded(lookup_timeout, remote.lookup_plates_by_keys(&keys)).await {
            Ok(plates) => plates,
            Err(e) => {
                tracing::debug!(error = %e, "Ownership refill dropped");
                continue;
            }
        };
        let plates: BTreeMap<_, _> = plates.into_iter().collect();
        let count = plates.len();
        if !cache.replace_owned(generation, plates).await {
            break;
        }
        tracing::debug!(count, "Ownership cache refilled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PlateId;
    use crate::infra::memory::{MemoryTreeStore, StoreOperation};
    use platform::clock::ManualClock;

    fn manager() -> (Arc<MemoryTreeStore>, ListenerLifecycleManager<MemoryTreeStore>, SharedCache) {
        let store = Arc::new(MemoryTreeStore::new(Arc::new(ManualClock::new(1_000))));
        let cache = SharedCache::new();
        let manager =
            ListenerLifecycleManager::new(Arc::clone(&store), cache.clone(), Duration::from_secs(1));
        (store, manager, cache)
    }

    fn user() -> UserId {
        UserId::parse("user-1").unwrap()
    }

    async fn wait_loaded(cache: &SharedCache, category: CacheCategory) {
        let mut revisions = cache.subscribe();
        while !cache.read().await.is_loaded(category) {
            revisions.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_activate_twice_is_noop() {
        let (store, manager, _) = manager();

        assert_eq!(
            manager.activate(UserChannel::Upvote, &user()).await.unwrap(),
            Activation::Activated
        );
        assert_eq!(
            manager.activate(UserChannel::Upvote, &user()).await.unwrap(),
            Activation::AlreadyActive
        );
        assert_eq!(store.watcher_count(), 1);
        assert_eq!(store.call_count(StoreOperation::Watch), 1);
    }

    #[tokio::test]
    async fn test_deactivate_detaches_and_clears() {
        let (store, manager, cache) = manager();
        let key = store.create_plate(&PlateId::parse("ABC", "1").unwrap()).await.unwrap();
        store.register_owner(&key, &user()).await.unwrap();

        manager.activate(UserChannel::Ownership, &user()).await.unwrap();
        wait_loaded(&cache, CacheCategory::Owned).await;
        assert_eq!(cache.read().await.owned_plates().len(), 1);

        assert!(manager.deactivate(ListenerKind::Ownership).await);
        assert_eq!(store.watcher_count(), 0);
        assert!(cache.read().await.owned_plates().is_empty());
        assert!(!manager.is_active(ListenerKind::Ownership).await);

        // Writes after deactivation never reach the cache
        let other = store.create_plate(&PlateId::parse("XYZ", "2").unwrap()).await.unwrap();
        store.register_owner(&other, &user()).await.unwrap();
        tokio::task::yield_now().await;
        assert!(cache.read().await.owned_plates().is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_inactive_returns_false() {
        let (_, manager, _) = manager();
        assert!(!manager.deactivate(ListenerKind::Downvote).await);
    }

    #[tokio::test]
    async fn test_failed_subscribe_leaves_channel_inactive() {
        let (store, manager, _) = manager();
        store.fail_next(StoreOperation::Watch);

        assert!(manager.activate(UserChannel::Downvote, &user()).await.is_err());
        assert!(!manager.is_active(ListenerKind::Downvote).await);
        assert_eq!(
            manager.activate(UserChannel::Downvote, &user()).await.unwrap(),
            Activation::Activated
        );
    }

    #[tokio::test]
    async fn test_report_pump_hydrates_entries() {
        let (store, manager, cache) = manager();
        let key = store.create_plate(&PlateId::parse("ABC", "1").unwrap()).await.unwrap();

        manager.activate(UserChannel::Downvote, &user()).await.unwrap();
        wait_loaded(&cache, CacheCategory::Downvoted).await;

        let mut revisions = cache.subscribe();
        store.log_report(&key, &user(), ReportDirection::Downvote).await.unwrap();
        revisions.changed().await.unwrap();

        let guard = cache.read().await;
        let entry = &guard.reports(ReportDirection::Downvote)[&key];
        assert_eq!(entry.plate.prefix, "ABC");
        assert_eq!(entry.timestamp_ms, 1_000);
    }

    #[tokio::test]
    async fn test_plate_channel_hands_snapshots_to_consumer() {
        let (store, manager, _) = manager();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        manager
            .activate_plate(|mut rx| async move {
                while let Some(collection) = rx.recv().await {
                    let _ = seen_tx.send(collection.len());
                }
            })
            .await
            .unwrap();

        assert_eq!(seen_rx.recv().await, Some(0));
        store.create_plate(&PlateId::parse("ABC", "1").unwrap()).await.unwrap();
        assert_eq!(seen_rx.recv().await, Some(1));

        manager.deactivate(ListenerKind::Plate).await;
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_finished_consumer_retires_channel() {
        let (store, manager, _) = manager();

        manager
            .activate_plate(|mut rx| async move {
                rx.recv().await;
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.is_active(ListenerKind::Plate).await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("plate channel still active");
        assert_eq!(store.watcher_count(), 0);

        // The retired channel can be activated again
        assert_eq!(
            manager.activate_plate(|_rx| async {}).await.unwrap(),
            Activation::Activated
        );
    }
}
