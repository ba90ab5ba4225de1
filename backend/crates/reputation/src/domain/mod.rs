//! Domain Layer
//!
//! Contains business entities, value objects, and the remote/local ports.

pub mod entities;
pub mod recent;
pub mod remote;
pub mod services;
pub mod value_objects;

pub use recent::{LocalRecentStore, RecentStore};
pub use remote::{LocalRemoteDataPort, RemoteDataPort, Subscription, SubscriptionHandle};
