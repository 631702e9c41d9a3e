/// Row Stream Reader
///
/// Opens a query against a connection and hands back a [`RowCursor`] whose
/// behaviour depends on the selected [`BufferingPolicy`]. Both policies yield
/// the same rows in the same order; they differ in when rows cross the link
/// and in whether the connection stays busy while they are read.

use super::connection::Connection;
use super::cursor::{BufferedCursor, RowCursor, UnbufferedCursor};
use super::query::Query;
use super::transport::{unexpected_reply, Reply, Request};
use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// How rows travel from the server to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferingPolicy {
    /// The whole result set is transferred in one round trip before the first row is returned
    #[default]
    Buffered,
    /// Rows are fetched one round trip at a time; the connection is busy until the end
    Unbuffered,
}

impl BufferingPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            BufferingPolicy::Buffered => "buffered",
            BufferingPolicy::Unbuffered => "unbuffered",
        }
    }
}

impl fmt::Display for BufferingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Executes `query` on `conn` under `policy`.
///
/// Buffered: one round trip transfers every row; the returned cursor never
/// touches the connection again. Unbuffered: one round trip opens the
/// server-side cursor and brings the first row; each further row costs one
/// round trip, and the connection refuses other queries until the cursor is
/// exhausted, closed or dropped.
///
/// # Errors
///
/// - `RowStreamError::Busy` if an unbuffered cursor is already open on `conn`
/// - `RowStreamError::Query` if the server rejects the query
/// - `RowStreamError::Connection` if the server is unreachable
pub fn stream<'c>(conn: &'c Connection, query: &Query, policy: BufferingPolicy) -> Result<RowCursor<'c>> {
    conn.ensure_idle()?;
    debug!("streaming {} ({})", query.sql(), policy);

    match policy {
        BufferingPolicy::Buffered => match conn.round_trip(Request::QueryAll(query.sql().to_string()))? {
            Reply::ResultSet(result_set) => Ok(RowCursor::Buffered(BufferedCursor::new(result_set))),
            other => Err(unexpected_reply("buffered query", &other)),
        },
        BufferingPolicy::Unbuffered => match conn.round_trip(Request::Open(query.sql().to_string()))? {
            Reply::Opened { columns, row, more } => Ok(RowCursor::Unbuffered(UnbufferedCursor::open(
                conn, columns, row, more,
            ))),
            other => Err(unexpected_reply("unbuffered query", &other)),
        },
    }
}

/// Policy-carrying front end to [`stream`]
#[derive(Debug, Clone, Copy)]
pub struct RowStreamReader<'c> {
    conn: &'c Connection,
    policy: BufferingPolicy,
}

impl<'c> RowStreamReader<'c> {
    /// Creates a reader using the connection's default policy.
    pub fn new(conn: &'c Connection) -> Self {
        RowStreamReader {
            conn,
            policy: conn.default_policy(),
        }
    }

    pub fn with_policy(mut self, policy: BufferingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> BufferingPolicy {
        self.policy
    }

    pub fn stream(&self, query: &Query) -> Result<RowCursor<'c>> {
        stream(self.conn, query, self.policy)
    }
}
