//! Reputation Cache
//!
//! Session-local mirror of the signed-in user's owned, upvoted and downvoted
//! plates. Each category is replaced wholesale by its listener and cleared
//! when the listener stops.
//!
//! ## Generations
//! Every category carries a generation counter. A listener captures the
//! generation when it starts and passes it back with each replacement;
//! clearing bumps the counter, so a push from a stopped listener is refused
//! instead of repopulating a cleared category.

use std::collections::BTreeMap;
use std::sync::Arc;

use kernel::id::PlateKey;
use tokio::sync::{RwLock, RwLockReadGuard, watch};

use crate::domain::entities::{Plate, ReportEntry};
use crate::domain::value_objects::{PlateIdentity, ReportDirection};

/// Cached category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    Owned,
    Upvoted,
    Downvoted,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 3] = [
        CacheCategory::Owned,
        CacheCategory::Upvoted,
        CacheCategory::Downvoted,
    ];

    const fn index(self) -> usize {
        match self {
            CacheCategory::Owned => 0,
            CacheCategory::Upvoted => 1,
            CacheCategory::Downvoted => 2,
        }
    }
}

impl From<ReportDirection> for CacheCategory {
    fn from(direction: ReportDirection) -> Self {
        match direction {
            ReportDirection::Upvote => CacheCategory::Upvoted,
            ReportDirection::Downvote => CacheCategory::Downvoted,
        }
    }
}

/// Snapshot-level cache state
#[derive(Debug, Default)]
pub struct ReputationCache {
    owned: BTreeMap<PlateKey, Plate>,
    upvoted: BTreeMap<PlateKey, ReportEntry>,
    downvoted: BTreeMap<PlateKey, ReportEntry>,
    generations: [u64; 3],
    loaded: [bool; 3],
}

impl ReputationCache {
    pub fn generation(&self, category: CacheCategory) -> u64 {
        self.generations[category.index()]
    }

    /// Whether the category received at least one snapshot since it was last cleared
    pub fn is_loaded(&self, category: CacheCategory) -> bool {
        self.loaded[category.index()]
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.loaded.iter().all(|loaded| *loaded)
    }

    /// Replace owned plates if `generation` is current
    pub fn replace_owned(&mut self, generation: u64, plates: BTreeMap<PlateKey, Plate>) -> bool {
        if !self.accepts(CacheCategory::Owned, generation) {
            return false;
        }
        self.owned = plates;
        self.loaded[CacheCategory::Owned.index()] = true;
        true
    }

    /// Replace one direction's reports if `generation` is current
    pub fn replace_reports(
        &mut self,
        direction: ReportDirection,
        generation: u64,
        entries: BTreeMap<PlateKey, ReportEntry>,
    ) -> bool {
        let category = CacheCategory::from(direction);
        if !self.accepts(category, generation) {
            return false;
        }
        match direction {
            ReportDirection::Upvote => self.upvoted = entries,
            ReportDirection::Downvote => self.downvoted = entries,
        }
        self.loaded[category.index()] = true;
        true
    }

    /// Empty a category and invalidate its current generation
    pub fn clear(&mut self, category: CacheCategory) {
        match category {
            CacheCategory::Owned => self.owned.clear(),
            CacheCategory::Upvoted => self.upvoted.clear(),
            CacheCategory::Downvoted => self.downvoted.clear(),
        }
        self.generations[category.index()] += 1;
        self.loaded[category.index()] = false;
    }

    pub fn clear_all(&mut self) {
        for category in CacheCategory::ALL {
            self.clear(category);
        }
    }

    fn accepts(&self, category: CacheCategory, generation: u64) -> bool {
        self.generations[category.index()] == generation
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn owned_plates(&self) -> Vec<Plate> {
        self.owned.values().cloned().collect()
    }

    pub fn reports(&self, direction: ReportDirection) -> &BTreeMap<PlateKey, ReportEntry> {
        match direction {
            ReportDirection::Upvote => &self.upvoted,
            ReportDirection::Downvote => &self.downvoted,
        }
    }

    pub fn upvoted_plates(&self) -> Vec<Plate> {
        self.upvoted.values().map(|entry| entry.plate.clone()).collect()
    }

    pub fn downvoted_plates(&self) -> Vec<Plate> {
        self.downvoted
            .values()
            .map(|entry| entry.plate.clone())
            .collect()
    }

    /// Report entries of both directions
    pub fn report_entries(&self) -> impl Iterator<Item = &ReportEntry> {
        self.upvoted.values().chain(self.downvoted.values())
    }

    /// Whether the user owns a plate with this (prefix, number)
    pub fn is_plate_owned(&self, plate: &impl PlateIdentity) -> bool {
        self.owned.values().any(|owned| owned.same_plate(plate))
    }
}

/// Shared, observable handle to the session cache
///
/// Every accepted change bumps a revision so waiters can re-check readiness.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<RwLock<ReputationCache>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCache {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(ReputationCache::default())),
            revision: Arc::new(revision),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ReputationCache> {
        self.inner.read().await
    }

    pub async fn generation(&self, category: CacheCategory) -> u64 {
        self.inner.read().await.generation(category)
    }

    pub async fn replace_owned(&self, generation: u64, plates: BTreeMap<PlateKey, Plate>) -> bool {
        let accepted = self.inner.write().await.replace_owned(generation, plates);
        if accepted {
            self.bump();
        }
        accepted
    }

    pub async fn replace_reports(
        &self,
        direction: ReportDirection,
        generation: u64,
        entries: BTreeMap<PlateKey, ReportEntry>,
    ) -> bool {
        let accepted = self
            .inner
            .write()
            .await
            .replace_reports(direction, generation, entries);
        if accepted {
            self.bump();
        }
        accepted
    }

    pub async fn clear(&self, category: CacheCategory) {
        self.inner.write().await.clear(category);
        self.bump();
    }

    pub async fn clear_all(&self) {
        self.inner.write().await.clear_all();
        self.bump();
    }

    /// Revision stream, bumped on every accepted change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
