/// Core Module for rowstream
///
/// This module contains the database layer (values, queries, the SQLite
/// server, connections and cursors) and the shared error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{Result, RowStreamError};
