//! Remote Data Port
//!
//! Interface to the shared tree store. Implementations are in the infra
//! layer; the in-memory store doubles as the test fake.
//!
//! Tree layout:
//! - `plates/{plateKey}` -> `{ prefix, number, reputation }`
//! - `users/{userId}/upvoted_plates/{plateKey}/timestamp`
//! - `users/{userId}/downvoted_plates/{plateKey}/timestamp`
//! - `users/{userId}/owned_plates/{plateKey}`

use kernel::id::{PlateKey, UserId};
use tokio::sync::mpsc;

use crate::domain::entities::{OwnedSnapshot, Plate, PlateCollection, ReportSnapshot};
use crate::domain::value_objects::{PlateId, ReportDirection};
use crate::error::ReputationResult;

/// Remote data port
#[trait_variant::make(RemoteDataPort: Send)]
pub trait LocalRemoteDataPort {
    /// Create the user node if it does not exist yet
    async fn create_user(&self, user_id: &UserId) -> ReputationResult<()>;

    /// Add `plate_key` to the user's owned plates
    async fn register_owner(&self, plate_key: &PlateKey, user_id: &UserId) -> ReputationResult<()>;

    /// Write a report record stamped with server time
    async fn log_report(
        &self,
        plate_key: &PlateKey,
        user_id: &UserId,
        direction: ReportDirection,
    ) -> ReputationResult<()>;

    /// Atomically add the direction's delta to the plate's reputation
    async fn increment_reputation(
        &self,
        plate_key: &PlateKey,
        direction: ReportDirection,
    ) -> ReputationResult<()>;

    /// One-shot read of the plates behind `keys`; missing keys are omitted
    async fn lookup_plates_by_keys(&self, keys: &[PlateKey])
    -> ReputationResult<Vec<(PlateKey, Plate)>>;

    /// Insert a plate with the starting reputation under a fresh key
    async fn create_plate(&self, id: &PlateId) -> ReputationResult<PlateKey>;

    /// Value listener on the whole `plates` collection
    async fn watch_plates(&self) -> ReputationResult<Subscription<PlateCollection>>;

    /// Value listener on one of the user's report sub-trees
    async fn watch_reports(
        &self,
        user_id: &UserId,
        direction: ReportDirection,
    ) -> ReputationResult<Subscription<ReportSnapshot>>;

    /// Value listener on the user's owned plates
    async fn watch_owned(&self, user_id: &UserId) -> ReputationResult<Subscription<OwnedSnapshot>>;
}

// ============================================================================
// Subscription
// ============================================================================

/// Live value listener
///
/// Each message is the full current value at the watched path. The first
/// message arrives once the listener is attached. Cancelling unregisters
/// the listener before returning; dropping does the same.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, handle: SubscriptionHandle) -> Self {
        Self { rx, handle }
    }

    /// Next snapshot, or `None` once the listener is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn cancel(self) {
        self.handle.cancel();
    }

    /// Split into the snapshot stream and the handle that detaches it
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<T>, SubscriptionHandle) {
        (self.rx, self.handle)
    }
}

/// Detaches a remote listener exactly once
pub struct SubscriptionHandle {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionHandle {
    pub fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn cancel(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
