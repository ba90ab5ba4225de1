//! In-Memory Recent Searches
//!
//! Insert-or-replace keyed by (owner, plate). Each owner's list is published
//! through a `watch` channel so readers see every change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use platform::clock::Clock;
use tokio::sync::watch;

use crate::domain::entities::RecentPlate;
use crate::domain::recent::RecentStore;
use crate::domain::value_objects::PlateId;
use crate::error::ReputationResult;

#[derive(Default)]
struct Lists {
    by_owner: HashMap<String, Vec<RecentPlate>>,
    publishers: HashMap<String, watch::Sender<Vec<RecentPlate>>>,
}

impl Lists {
    fn publish(&mut self, owner: &str) {
        let list = self.by_owner.get(owner).cloned().unwrap_or_default();
        if let Some(publisher) = self.publishers.get(owner) {
            publisher.send_replace(list);
        }
    }
}

/// In-memory recent-plate store
pub struct MemoryRecentStore {
    lists: Mutex<Lists>,
    clock: Arc<dyn Clock>,
}

impl MemoryRecentStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            lists: Mutex::new(Lists::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lists> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecentStore for MemoryRecentStore {
    async fn insert(&self, owner: &str, plate: &PlateId) -> ReputationResult<()> {
        let searched_at_ms = self.clock.now_ms();
        let mut lists = self.lock();
        let list = lists.by_owner.entry(owner.to_string()).or_default();
        list.retain(|entry| entry.plate != *plate);
        list.push(RecentPlate {
            owner: owner.to_string(),
            plate: plate.clone(),
            searched_at_ms,
        });
        // Stable: equal timestamps keep insertion order
        list.sort_by_key(|entry| entry.searched_at_ms);
        lists.publish(owner);
        Ok(())
    }

    async fn delete(&self, owner: &str, plate: &PlateId) -> ReputationResult<()> {
        let mut lists = self.lock();
        if let Some(list) = lists.by_owner.get_mut(owner) {
            list.retain(|entry| entry.plate != *plate);
        }
        lists.publish(owner);
        Ok(())
    }

    fn query_by_user(&self, owner: &str) -> watch::Receiver<Vec<RecentPlate>> {
        let mut lists = self.lock();
        if let Some(publisher) = lists.publishers.get(owner) {
            return publisher.subscribe();
        }
        let current = lists.by_owner.get(owner).cloned().unwrap_or_default();
        let (publisher, rx) = watch::channel(current);
        lists.publishers.insert(owner.to_string(), publisher);
        rx
    }
}
