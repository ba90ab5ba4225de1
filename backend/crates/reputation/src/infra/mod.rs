//! Infrastructure Layer
//!
//! Store implementations behind the domain ports.

pub mod memory;
pub mod recent;
pub mod rest;

#[cfg(test)]
mod fake_tree;
