//! Data models for the PostgreSQL helper.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;

// Re-export commonly used types
pub use query::{DEFAULT_CHUNK_SIZE, QueryParam, QueryRows, ResultShape};
