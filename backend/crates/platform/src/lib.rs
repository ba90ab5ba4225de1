//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Wall clock abstraction (server-comparable milliseconds)
//! - Connectivity probing
//! - Deadlines for one-shot asynchronous operations
//! - Cooldown window arithmetic for rate limiting

pub mod clock;
pub mod connectivity;
pub mod deadline;
pub mod rate_limit;
