/// Connection Management Module
///
/// A `Connection` is the client side of one link to a database server. It
/// counts round trips and tracks whether an unbuffered cursor currently owns
/// the link.

use super::cursor::RowCursor;
use super::query::Query;
use super::reader::{self, BufferingPolicy};
use super::server::SqliteServer;
use super::transport::{unexpected_reply, Credentials, Reply, Request, Transport};
use crate::core::{Result, RowStreamError};
use std::cell::{Cell, RefCell};
use std::fmt;
use tracing::{debug, info};

/// Everything needed to open a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Database file path, `file:` URI, or `:memory:`
    pub endpoint: String,
    pub credentials: Credentials,
    /// Policy used by `Connection::query` and `RowStreamReader::new`
    pub default_policy: BufferingPolicy,
}

impl ConnectOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        ConnectOptions {
            endpoint: endpoint.into(),
            credentials: Credentials::default(),
            default_policy: BufferingPolicy::default(),
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    pub fn default_policy(mut self, policy: BufferingPolicy) -> Self {
        self.default_policy = policy;
        self
    }
}

/// An open, authenticated link to a database
pub struct Connection {
    endpoint: String,
    username: String,
    default_policy: BufferingPolicy,
    transport: RefCell<Box<dyn Transport>>,
    round_trips: Cell<u64>,
    busy: Cell<bool>,
    // Set once the handshake succeeds.
    connected: bool,
}

impl Connection {
    /// Opens a connection to the SQLite database named by `options.endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `RowStreamError::Connection` if the database cannot be opened
    /// or the handshake is rejected.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rowstream::core::db::{BufferingPolicy, ConnectOptions, Connection, Query};
    ///
    /// let conn = Connection::open(&ConnectOptions::new("example.db"))?;
    /// let query = Query::select_all("users")?;
    /// for row in conn.stream(&query, BufferingPolicy::Unbuffered)? {
    ///     print!("{}", row?.dump());
    /// }
    /// # Ok::<(), rowstream::core::RowStreamError>(())
    /// ```
    pub fn open(options: &ConnectOptions) -> Result<Self> {
        let server = SqliteServer::start(&options.endpoint)?;
        Connection::with_transport(options, Box::new(server))
    }

    /// Opens a connection over an existing transport and performs the handshake.
    pub fn with_transport(options: &ConnectOptions, transport: Box<dyn Transport>) -> Result<Self> {
        let mut conn = Connection {
            endpoint: options.endpoint.clone(),
            username: options.credentials.username.clone(),
            default_policy: options.default_policy,
            transport: RefCell::new(transport),
            round_trips: Cell::new(0),
            busy: Cell::new(false),
            connected: false,
        };

        match conn.round_trip(Request::Handshake(options.credentials.clone()))? {
            Reply::Ready => {}
            other => return Err(unexpected_reply("handshake", &other)),
        }

        conn.connected = true;
        info!("Connected to {} as '{}'", conn.endpoint, conn.username);
        Ok(conn)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn default_policy(&self) -> BufferingPolicy {
        self.default_policy
    }

    /// Number of round trips made on this connection, handshake included.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.get()
    }

    /// True while an unbuffered cursor is outstanding.
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Streams `query` under `policy`. See [`reader::stream`].
    pub fn stream(&self, query: &Query, policy: BufferingPolicy) -> Result<RowCursor<'_>> {
        reader::stream(self, query, policy)
    }

    /// Streams `query` under the connection's default policy.
    pub fn query(&self, query: &Query) -> Result<RowCursor<'_>> {
        reader::stream(self, query, self.default_policy)
    }

    /// Closes the connection and stops its server.
    pub fn close(self) {
        drop(self);
    }

    /// Fails with `Busy` if an unbuffered cursor is outstanding.
    pub(crate) fn ensure_idle(&self) -> Result<()> {
        if self.busy.get() {
            return Err(RowStreamError::Busy);
        }
        Ok(())
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.busy.set(busy);
    }

    pub(crate) fn round_trip(&self, request: Request) -> Result<Reply> {
        let count = self.round_trips.get() + 1;
        self.round_trips.set(count);
        debug!("round trip #{} to {}: {:?}", count, self.endpoint, request);
        self.transport.borrow_mut().round_trip(request)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("default_policy", &self.default_policy)
            .field("round_trips", &self.round_trips.get())
            .field("busy", &self.busy.get())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.transport.get_mut().shutdown();
        if self.connected {
            info!("Connection to {} closed", self.endpoint);
        }
    }
}
