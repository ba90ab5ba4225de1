//! Reputation Module
//!
//! Client-side synchronization engine for license-plate reputation:
//! - `domain/` - plates, report records and the remote/local store ports
//! - `application/` - sessions, live listeners, the per-user cache,
//!   find-or-create lookup and rate-limited reporting
//! - `infra/` - an in-memory tree store, a REST tree store and the
//!   recent-searches store
//!
//! ## Usage
//! 1. Build a [`ReputationEngine`] over a store and a connectivity probe
//! 2. Open a [`Session`] on login (`login_existing`, `create_new_user`,
//!    `enter_anonymous`)
//! 3. `start_user_listeners`, then `find_or_create` and `report`
//! 4. `sign_out` detaches every listener and clears the cache

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;

// Re-exports for convenience
pub use application::config::ReputationConfig;
pub use application::listeners::ListenerKind;
pub use application::engine::ReputationEngine;
pub use application::plate_lookup::{LookupState, PlateFeed};
pub use application::reports::ReportReceipt;
pub use application::session::{Session, SessionSignals, SessionState};
pub use domain::entities::{Plate, RecentPlate};
pub use domain::value_objects::{PlateId, ReportDirection};
pub use error::{ReputationError, ReputationResult};
pub use infra::memory::MemoryTreeStore;
pub use infra::recent::MemoryRecentStore;
pub use infra::rest::{RestStoreConfig, RestTreeStore};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
