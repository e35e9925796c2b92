//! PostgreSQL helper library.
//!
//! This library wraps a single PostgreSQL connection with blocking
//! convenience operations: queries in positional or named row shape, counts,
//! inserts, updates, deletes, chunked bulk inserts and explicit transaction
//! control.

pub mod config;
pub mod db;
pub mod error;
pub mod helper;
pub mod logging;
pub mod models;

pub use config::ConnectionConfig;
pub use error::{DbResult, HelperError};
pub use helper::PostgresHelper;
pub use models::{DEFAULT_CHUNK_SIZE, QueryParam, QueryRows, ResultShape};
