//! Shared Kernel - Domain-crossing minimal core
//!
//! This crate contains the "smallest core" of domain vocabulary:
//! - Common error taxonomy and result aliases
//! - Typed keys for store-generated identifiers
//! - The Loading → terminal signal contract for asynchronous operations
//!
//! **Design Principle**: Only include things that are "hard to change"
//! and have consistent meaning across all domains.

pub mod error {
    pub mod app_error;
    pub mod kind;
}
pub mod id;
pub mod signal;
