/// Database Module
///
/// This module provides the row streaming layer, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Values** (`value.rs`): column values and rows as ordered column-name mappings
/// - **Queries** (`query.rs`): validated read commands
/// - **Transport** (`transport.rs`): the request/reply protocol; one call is one round trip
/// - **Server** (`server.rs`): a worker thread serving a SQLite database over the transport
/// - **Connections** (`connection.rs`): endpoint, credentials, round-trip accounting, busy state
/// - **Cursors** (`cursor.rs`): buffered and unbuffered row iteration
/// - **Reader** (`reader.rs`): policy selection and the `stream` entry point
///
/// ## Error Handling
///
/// All operations return `RowStreamError`; connection failures and query
/// failures are kept apart so callers can report them differently.
pub mod connection;
pub mod cursor;
pub mod query;
pub mod reader;
pub mod server;
pub mod transport;
pub mod value;

pub use connection::*;
pub use cursor::*;
pub use query::*;
pub use reader::*;
pub use server::*;
pub use transport::*;
pub use value::*;
