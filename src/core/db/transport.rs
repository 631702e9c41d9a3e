/// Transport Module
///
/// The request/reply protocol between a `Connection` and the database
/// server. Every `Transport::round_trip` call is exactly one round trip.

use super::value::Value;
use crate::core::{Result, RowStreamError};
use std::fmt;

/// Username and password presented during the handshake
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A complete result set, as transferred by a buffered query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Requests a client may send to the server
#[derive(Debug, Clone)]
pub enum Request {
    /// Authenticate; must be the first request on a transport
    Handshake(Credentials),
    /// Run a query and return every row in one reply
    QueryAll(String),
    /// Open a server-side cursor; the reply carries the first row
    Open(String),
    /// Fetch the next row of the open cursor
    Fetch,
    /// Discard the open cursor
    Close,
}

/// Replies to `Request`s
#[derive(Debug)]
pub enum Reply {
    Ready,
    ResultSet(ResultSet),
    /// `more` is false once the cursor has no row after `row`
    Opened {
        columns: Vec<String>,
        row: Option<Vec<Value>>,
        more: bool,
    },
    Fetched {
        row: Option<Vec<Value>>,
        more: bool,
    },
    Closed,
    Failed(RowStreamError),
}

impl Reply {
    /// Turns a `Failed` reply into an error.
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Failed(err) => Err(err),
            reply => Ok(reply),
        }
    }
}

/// A link to a database server.
///
/// Implementations block until the reply arrives. Server-side failures come
/// back as `Err`, never as `Reply::Failed`.
pub trait Transport {
    fn round_trip(&mut self, request: Request) -> Result<Reply>;

    /// Releases the link. Called once when the owning connection closes.
    fn shutdown(&mut self) {}
}

/// Error for a reply that does not answer the request that was sent.
pub fn unexpected_reply(request: &str, reply: &Reply) -> RowStreamError {
    RowStreamError::Connection(format!(
        "Protocol error: unexpected reply to {}: {:?}",
        request, reply
    ))
}
