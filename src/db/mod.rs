//! Database access layer.
//!
//! This module provides the pieces the helper is built from:
//! - The single-connection session with implicit transaction tracking
//! - Parameter binding
//! - Row decoding into positional or named JSON values
//! - Statement classification
//! - Text rendering of binary values for types without a JSON decoder
//! - The `params!` macro

#[macro_use]
pub mod macros;
pub(crate) mod params;
pub mod session;
pub mod statement;
pub(crate) mod text_format;
pub mod types;

pub use session::Session;
pub use statement::{TransactionControl, is_select, transaction_control};
pub use types::{RowDecode, TypeCategory, categorize_type};
