//! Identity Module
//!
//! Boundary to the hosted identity provider:
//! - `domain/` - the `AuthProvider` contract and credential format rules
//! - `application/` - `AuthGateway`, which races every provider call against
//!   a deadline and reports it as a Loading → terminal signal stream
//!
//! The provider client itself is supplied by the embedding application.

pub mod application;
pub mod domain;
pub mod error;

// Re-exports for convenience
pub use application::config::IdentityConfig;
pub use application::gateway::AuthGateway;
pub use domain::provider::AuthProvider;
pub use error::{AuthFailure, AuthResult};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
