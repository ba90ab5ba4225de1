//! Application Layer
//!
//! Session orchestration: listener lifecycle, the shared cache, plate
//! lookup, reporting and the rate-limit policy.

pub mod cache;
pub mod config;
pub mod engine;
pub mod listeners;
pub mod plate_lookup;
pub mod rate_limit;
pub mod reports;
pub mod session;
