//! In-Memory Tree Store
//!
//! `RemoteDataPort` over a process-local tree. Every write pushes the new
//! value to the listeners attached to the paths it touched. Faults can be
//! queued per operation to exercise failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use kernel::id::{PlateKey, UserId};
use platform::clock::Clock;
use tokio::sync::mpsc;

use crate::domain::entities::{
    INITIAL_REPUTATION, OwnedSnapshot, Plate, PlateCollection, ReportSnapshot,
};
use crate::domain::remote::{RemoteDataPort, Subscription, SubscriptionHandle};
use crate::domain::services::next_server_timestamp;
use crate::domain::value_objects::{PlateId, ReportDirection};
use crate::error::{ReputationError, ReputationResult};

/// Store operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    CreateUser,
    RegisterOwner,
    LogReport,
    IncrementReputation,
    LookupPlates,
    CreatePlate,
    Watch,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Fail,
    Stall,
}

#[derive(Debug, Default)]
struct UserNode {
    upvoted: ReportSnapshot,
    downvoted: ReportSnapshot,
    owned: BTreeSet<PlateKey>,
}

impl UserNode {
    fn reports(&self, direction: ReportDirection) -> &ReportSnapshot {
        match direction {
            ReportDirection::Upvote => &self.upvoted,
            ReportDirection::Downvote => &self.downvoted,
        }
    }

    fn reports_mut(&mut self, direction: ReportDirection) -> &mut ReportSnapshot {
        match direction {
            ReportDirection::Upvote => &mut self.upvoted,
            ReportDirection::Downvote => &mut self.downvoted,
        }
    }
}

/// Path a write touched
enum Touched<'a> {
    Plates,
    Reports(&'a UserId, ReportDirection),
    Owned(&'a UserId),
}

enum Watcher {
    Plates(mpsc::UnboundedSender<PlateCollection>),
    Reports {
        user_id: UserId,
        direction: ReportDirection,
        tx: mpsc::UnboundedSender<ReportSnapshot>,
    },
    Owned {
        user_id: UserId,
        tx: mpsc::UnboundedSender<OwnedSnapshot>,
    },
}

#[derive(Default)]
struct Tree {
    plates: BTreeMap<PlateKey, Plate>,
    users: BTreeMap<UserId, UserNode>,
    watchers: BTreeMap<u64, Watcher>,
    next_watcher_id: u64,
    next_plate_seq: u64,
    last_timestamp_ms: i64,
    faults: HashMap<StoreOperation, VecDeque<Fault>>,
    calls: HashMap<StoreOperation, usize>,
    offline: bool,
}

impl Tree {
    fn plate_collection(&self) -> PlateCollection {
        PlateCollection::new(self.plates.clone())
    }

    fn report_snapshot(&self, user_id: &UserId, direction: ReportDirection) -> ReportSnapshot {
        self.users
            .get(user_id)
            .map(|user| user.reports(direction).clone())
            .unwrap_or_default()
    }

    fn owned_snapshot(&self, user_id: &UserId) -> OwnedSnapshot {
        self.users
            .get(user_id)
            .map(|user| user.owned.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Push the new value to every listener on `touched`
    ///
    /// Listeners whose receiver is gone are dropped.
    fn notify(&mut self, touched: Touched<'_>) {
        let mut closed = Vec::new();
        for (id, watcher) in &self.watchers {
            let delivered = match (watcher, &touched) {
                (Watcher::Plates(tx), Touched::Plates) => tx.send(self.plate_collection()).is_ok(),
                (
                    Watcher::Reports {
                        user_id,
                        direction,
                        tx,
                    },
                    Touched::Reports(target, target_direction),
                ) if user_id == *target && direction == target_direction => {
                    tx.send(self.report_snapshot(user_id, *direction)).is_ok()
                }
                (Watcher::Owned { user_id, tx }, Touched::Owned(target)) if user_id == *target => {
                    tx.send(self.owned_snapshot(user_id)).is_ok()
                }
                _ => true,
            };
            if !delivered {
                closed.push(*id);
            }
        }
        for id in closed {
            self.watchers.remove(&id);
        }
    }

    fn attach(&mut self, watcher: Watcher) -> u64 {
        let id = self.next_watcher_id;
        self.next_watcher_id += 1;
        self.watchers.insert(id, watcher);
        id
    }
}

/// In-memory tree store
pub struct MemoryTreeStore {
    tree: Arc<Mutex<Tree>>,
    clock: Arc<dyn Clock>,
    initial_reputation: f64,
}

impl MemoryTreeStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::default())),
            clock,
            initial_reputation: INITIAL_REPUTATION,
        }
    }

    pub fn with_initial_reputation(mut self, reputation: f64) -> Self {
        self.initial_reputation = reputation;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Fail the next call of `operation` with a network error
    pub fn fail_next(&self, operation: StoreOperation) {
        self.push_fault(operation, Fault::Fail);
    }

    /// Never complete the next call of `operation`
    pub fn stall_next(&self, operation: StoreOperation) {
        self.push_fault(operation, Fault::Stall);
    }

    /// Fail every call with a network error while offline
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    fn push_fault(&self, operation: StoreOperation, fault: Fault) {
        self.lock()
            .faults
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    /// Count the call and apply any queued fault
    async fn gate(&self, operation: StoreOperation) -> ReputationResult<()> {
        let fault = {
            let mut tree = self.lock();
            *tree.calls.entry(operation).or_default() += 1;
            if tree.offline {
                return Err(ReputationError::Network("store is offline".into()));
            }
            tree.faults
                .get_mut(&operation)
                .and_then(VecDeque::pop_front)
        };
        match fault {
            None => Ok(()),
            Some(Fault::Fail) => Err(ReputationError::Network(format!(
                "injected failure in {:?}",
                operation
            ))),
            Some(Fault::Stall) => std::future::pending().await,
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Calls made to `operation`, including failed ones
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Listeners currently attached
    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    pub fn plate(&self, key: &PlateKey) -> Option<Plate> {
        self.lock().plates.get(key).cloned()
    }

    pub fn plates(&self) -> PlateCollection {
        self.lock().plate_collection()
    }

    pub fn user_exists(&self, user_id: &UserId) -> bool {
        self.lock().users.contains_key(user_id)
    }

    pub fn report_timestamp(
        &self,
        user_id: &UserId,
        direction: ReportDirection,
        key: &PlateKey,
    ) -> Option<i64> {
        self.lock()
            .users
            .get(user_id)
            .and_then(|user| user.reports(direction).get(key).copied())
    }

    pub fn owned_plates(&self, user_id: &UserId) -> OwnedSnapshot {
        self.lock().owned_snapshot(user_id)
    }

    /// Insert a plate under an explicit key, bypassing faults
    pub fn seed_plate(&self, key: PlateKey, plate: Plate) {
        let mut tree = self.lock();
        tree.plates.insert(key, plate);
        tree.notify(Touched::Plates);
    }

    /// Insert a report record with an explicit timestamp, bypassing faults
    pub fn seed_report(
        &self,
        user_id: &UserId,
        direction: ReportDirection,
        key: PlateKey,
        timestamp_ms: i64,
    ) {
        let mut tree = self.lock();
        tree.users
            .entry(user_id.clone())
            .or_default()
            .reports_mut(direction)
            .insert(key, timestamp_ms);
        tree.notify(Touched::Reports(user_id, direction));
    }

    fn detach_handle(&self, watcher_id: u64) -> SubscriptionHandle {
        let tree: Weak<Mutex<Tree>> = Arc::downgrade(&self.tree);
        SubscriptionHandle::new(move || {
            if let Some(tree) = tree.upgrade() {
                tree.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .watchers
                    .remove(&watcher_id);
            }
        })
    }
}

impl RemoteDataPort for MemoryTreeStore {
    async fn create_user(&self, user_id: &UserId) -> ReputationResult<()> {
        self.gate(StoreOperation::CreateUser).await?;
        self.lock().users.entry(user_id.clone()).or_default();
        Ok(())
    }

    async fn register_owner(&self, plate_key: &PlateKey, user_id: &UserId) -> ReputationResult<()> {
        self.gate(StoreOperation::RegisterOwner).await?;
        let mut tree = self.lock();
        tree.users
            .entry(user_id.clone())
            .or_default()
            .owned
            .insert(plate_key.clone());
        tree.notify(Touched::Owned(user_id));
        Ok(())
    }

    async fn log_report(
        &self,
        plate_key: &PlateKey,
        user_id: &UserId,
        direction: ReportDirection,
    ) -> ReputationResult<()> {
        self.gate(StoreOperation::LogReport).await?;
        let now_ms = self.clock.now_ms();
        let mut tree = self.lock();
        let timestamp_ms = next_server_timestamp(tree.last_timestamp_ms, now_ms);
        tree.last_timestamp_ms = timestamp_ms;
        tree.users
            .entry(user_id.clone())
            .or_default()
            .reports_mut(direction)
            .insert(plate_key.clone(), timestamp_ms);
        tree.notify(Touched::Reports(user_id, direction));
        Ok(())
    }

    async fn increment_reputation(
        &self,
        plate_key: &PlateKey,
        direction: ReportDirection,
    ) -> ReputationResult<()> {
        self.gate(StoreOperation::IncrementReputation).await?;
        let mut tree = self.lock();
        let plate = tree
            .plates
            .get_mut(plate_key)
            .ok_or_else(|| ReputationError::PlateNotFound(plate_key.clone()))?;
        plate.reputation += direction.delta() as f64;
        tree.notify(Touched::Plates);
        Ok(())
    }

    async fn lookup_plates_by_keys(
        &self,
        keys: &[PlateKey],
    ) -> ReputationResult<Vec<(PlateKey, Plate)>> {
        self.gate(StoreOperation::LookupPlates).await?;
        let tree = self.lock();
        Ok(keys
            .iter()
            .filter_map(|key| tree.plates.get(key).map(|plate| (key.clone(), plate.clone())))
            .collect())
    }

    async fn create_plate(&self, id: &PlateId) -> ReputationResult<PlateKey> {
        self.gate(StoreOperation::CreatePlate).await?;
        let mut tree = self.lock();
        let key = PlateKey::parse(format!("plate-{:010}", tree.next_plate_seq))?;
        tree.next_plate_seq += 1;
        tree.plates
            .insert(key.clone(), Plate::new(id, self.initial_reputation));
        tree.notify(Touched::Plates);
        Ok(key)
    }

    async fn watch_plates(&self) -> ReputationResult<Subscription<PlateCollection>> {
        self.gate(StoreOperation::Watch).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher_id = {
            let mut tree = self.lock();
            // Initial value; the receiver is still held here
            let _ = tx.send(tree.plate_collection());
            tree.attach(Watcher::Plates(tx))
        };
        Ok(Subscription::new(rx, self.detach_handle(watcher_id)))
    }

    async fn watch_reports(
        &self,
        user_id: &UserId,
        direction: ReportDirection,
    ) -> ReputationResult<Subscription<ReportSnapshot>> {
        self.gate(StoreOperation::Watch).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher_id = {
            let mut tree = self.lock();
            let _ = tx.send(tree.report_snapshot(user_id, direction));
            tree.attach(Watcher::Reports {
                user_id: user_id.clone(),
                direction,
                tx,
            })
        };
        Ok(Subscription::new(rx, self.detach_handle(watcher_id)))
    }

    async fn watch_owned(&self, user_id: &UserId) -> ReputationResult<Subscription<OwnedSnapshot>> {
        self.gate(StoreOperation::Watch).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher_id = {
            let mut tree = self.lock();
            let _ = tx.send(tree.owned_snapshot(user_id));
            tree.attach(Watcher::Owned {
                user_id: user_id.clone(),
                tx,
            })
        };
        Ok(Subscription::new(rx, self.detach_handle(watcher_id)))
    }
}
