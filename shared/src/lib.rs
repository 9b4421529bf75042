//! Shared types and utilities for covfetch
//!
//! This crate contains the coverage data model, the block wire codec spoken
//! with coverage agents (and reused for the on-disk store), and small helpers
//! used across the client, the store and the CLI.

pub mod types;
pub mod utils;

#[cfg(feature = "wire-protocol")]
pub mod protocol;

// Re-export commonly used types
pub use types::coverage::*;
