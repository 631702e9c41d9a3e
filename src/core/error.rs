/// Rowstream Error Module
///
/// This module defines the error taxonomy shared by the connection, query and
/// cursor layers, plus the ambient configuration and I/O failures of the
/// comparison binary.
use thiserror::Error;

/// Error type for every fallible rowstream operation.
///
/// Streaming itself only ever fails in three ways:
/// - the endpoint cannot be reached or rejects the handshake (`Connection`)
/// - the server rejects the command (`Query`)
/// - an unbuffered result set is still open on the connection (`Busy`)
#[derive(Error, Debug)]
pub enum RowStreamError {
    /// The connection could not be established, authenticated, or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// The command was malformed, not a read query, or failed on the server
    #[error("Query error: {0}")]
    Query(String),

    /// Another query was issued while an unbuffered cursor is outstanding
    #[error("Connection busy: an unbuffered result set is still open on this connection")]
    Busy,

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Output and file system errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON row encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RowStreamError {
    /// Returns true for failures to reach or authenticate with the endpoint.
    pub fn is_connection(&self) -> bool {
        matches!(self, RowStreamError::Connection(_))
    }

    /// Returns true for failures reported by the server for a command.
    pub fn is_query(&self) -> bool {
        matches!(self, RowStreamError::Query(_))
    }
}

/// Type alias for Result to use RowStreamError as the error type.
pub type Result<T> = std::result::Result<T, RowStreamError>;
