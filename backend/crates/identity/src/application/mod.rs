//! Application Layer
//!
//! Orchestrates provider calls for the UI layer.

pub mod config;
pub mod gateway;
