//! Recent Searches Port
//!
//! Device-local list of plates a user looked up. Entries are keyed by
//! owner (a user id, or the anonymous sentinel) and plate.

use tokio::sync::watch;

use crate::domain::entities::RecentPlate;
use crate::domain::value_objects::PlateId;
use crate::error::ReputationResult;

/// Local recent-plate store
#[trait_variant::make(RecentStore: Send)]
pub trait LocalRecentStore {
    /// Record a search; re-inserting an existing entry refreshes its timestamp
    async fn insert(&self, owner: &str, plate: &PlateId) -> ReputationResult<()>;

    /// Remove a single entry
    async fn delete(&self, owner: &str, plate: &PlateId) -> ReputationResult<()>;

    /// Live list for `owner`, oldest search first
    fn query_by_user(&self, owner: &str) -> watch::Receiver<Vec<RecentPlate>>;
}
