//! Domain Layer
//!
//! Contains the provider contract and credential rules.

pub mod credentials;
pub mod provider;

// Re-exports
pub use provider::{AuthProvider, LocalAuthProvider};
