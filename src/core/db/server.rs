/// SQLite Server Module
///
/// Runs a SQLite database on a dedicated worker thread and serves it through
/// the `Transport` protocol. The worker owns the `rusqlite::Connection` and
/// every statement; the client only ever sees replies on a channel.
///
/// While a cursor is open the worker holds its statement on its own stack and
/// answers nothing but `Fetch` and `Close`. It keeps one row of lookahead so
/// each reply can say whether another row follows.

use super::transport::{Reply, Request, ResultSet, Transport};
use super::value::Value;
use crate::core::{Result, RowStreamError};
use rusqlite::{Connection, OpenFlags};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::{debug, error};

/// Endpoint that opens a private in-memory database
pub const MEMORY_ENDPOINT: &str = ":memory:";

/// Client half of a SQLite worker thread
#[derive(Debug)]
pub struct SqliteServer {
    requests: Option<Sender<Request>>,
    replies: Receiver<Reply>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SqliteServer {
    /// Opens the database at `endpoint` and starts the worker thread.
    ///
    /// The database must already exist; a missing file is reported like an
    /// unreachable host.
    ///
    /// # Errors
    ///
    /// Returns `RowStreamError::Connection` if the database cannot be opened
    /// or the worker thread cannot be spawned.
    pub fn start(endpoint: &str) -> Result<Self> {
        let conn = open_database(endpoint)?;

        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("rowstream-sqlite".to_string())
            .spawn(move || serve(conn, request_rx, reply_tx))
            .map_err(|e| RowStreamError::Connection(format!("Failed to start server thread: {}", e)))?;

        debug!("SQLite server started for {}", endpoint);
        Ok(SqliteServer {
            requests: Some(request_tx),
            replies: reply_rx,
            worker: Some(worker),
        })
    }
}

impl Transport for SqliteServer {
    fn round_trip(&mut self, request: Request) -> Result<Reply> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| RowStreamError::Connection("Server has been shut down".to_string()))?;
        requests
            .send(request)
            .map_err(|_| RowStreamError::Connection("Server thread has exited".to_string()))?;
        self.replies
            .recv()
            .map_err(|_| RowStreamError::Connection("Server thread has exited".to_string()))?
            .into_result()
    }

    fn shutdown(&mut self) {
        // Dropping the sender ends the worker's receive loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("SQLite server thread panicked");
            }
            debug!("SQLite server stopped");
        }
    }
}

impl Drop for SqliteServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_database(endpoint: &str) -> Result<Connection> {
    let conn = if endpoint == MEMORY_ENDPOINT {
        Connection::open_in_memory()
    } else {
        Connection::open_with_flags(
            endpoint,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    };
    let conn = conn.map_err(|e| RowStreamError::Connection(format!("Cannot open {}: {}", endpoint, e)))?;

    // Files are opened lazily; read the header now so a non-database fails here.
    conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
        .map_err(|e| RowStreamError::Connection(format!("Cannot open {}: {}", endpoint, e)))?;
    Ok(conn)
}

fn serve(conn: Connection, requests: Receiver<Request>, replies: Sender<Reply>) {
    while let Ok(request) = requests.recv() {
        debug!("server request: {:?}", request);
        let reply = match request {
            // SQLite has no user model; any credentials are accepted.
            Request::Handshake(_) => Reply::Ready,
            Request::QueryAll(sql) => match query_all(&conn, &sql) {
                Ok(result_set) => Reply::ResultSet(result_set),
                Err(e) => Reply::Failed(e),
            },
            Request::Open(sql) => {
                if serve_cursor(&conn, &sql, &requests, &replies) {
                    continue;
                }
                break;
            }
            Request::Fetch | Request::Close => {
                Reply::Failed(RowStreamError::Query("No open cursor".to_string()))
            }
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
}

fn query_all(conn: &Connection, sql: &str) -> Result<ResultSet> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| RowStreamError::Query(format!("Failed to prepare statement: {}", e)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = columns.len();

    let rows = stmt
        .query_map([], |row| read_values(row, column_count))
        .map_err(|e| RowStreamError::Query(format!("Query execution failed: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RowStreamError::Query(format!("Result processing failed: {}", e)))?;

    Ok(ResultSet { columns, rows })
}

/// Serves one cursor until it is exhausted, closed or fails.
///
/// Returns false when the client has gone away.
fn serve_cursor(
    conn: &Connection,
    sql: &str,
    requests: &Receiver<Request>,
    replies: &Sender<Reply>,
) -> bool {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            let err = RowStreamError::Query(format!("Failed to prepare statement: {}", e));
            return replies.send(Reply::Failed(err)).is_ok();
        }
    };
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = columns.len();

    let mut rows = match stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => {
            let err = RowStreamError::Query(format!("Query execution failed: {}", e));
            return replies.send(Reply::Failed(err)).is_ok();
        }
    };

    let mut step = || -> Result<Option<Vec<Value>>> {
        match rows.next() {
            Ok(Some(row)) => read_values(row, column_count)
                .map(Some)
                .map_err(|e| RowStreamError::Query(format!("Result processing failed: {}", e))),
            Ok(None) => Ok(None),
            Err(e) => Err(RowStreamError::Query(format!("Query execution failed: {}", e))),
        }
    };

    // A failed read is held back until the rows read before it are delivered.
    let mut deferred: Option<RowStreamError> = None;
    let first = match step() {
        Ok(first) => first,
        Err(e) => return replies.send(Reply::Failed(e)).is_ok(),
    };
    let mut lookahead = None;
    if first.is_some() {
        match step() {
            Ok(next) => lookahead = next,
            Err(e) => deferred = Some(e),
        }
    }

    let more = lookahead.is_some() || deferred.is_some();
    if replies.send(Reply::Opened { columns, row: first, more }).is_err() {
        return false;
    }
    if !more {
        return true;
    }

    while let Ok(request) = requests.recv() {
        debug!("cursor request: {:?}", request);
        match request {
            Request::Fetch => {
                if let Some(e) = deferred.take() {
                    return replies.send(Reply::Failed(e)).is_ok();
                }
                let row = lookahead.take();
                match step() {
                    Ok(next) => lookahead = next,
                    Err(e) => deferred = Some(e),
                }
                let more = lookahead.is_some() || deferred.is_some();
                if replies.send(Reply::Fetched { row, more }).is_err() {
                    return false;
                }
                if !more {
                    return true;
                }
            }
            Request::Close => return replies.send(Reply::Closed).is_ok(),
            Request::Handshake(_) | Request::QueryAll(_) | Request::Open(_) => {
                if replies.send(Reply::Failed(RowStreamError::Busy)).is_err() {
                    return false;
                }
            }
        }
    }
    false
}

fn read_values(row: &rusqlite::Row<'_>, column_count: usize) -> rusqlite::Result<Vec<Value>> {
    (0..column_count)
        .map(|i| row.get_ref(i).map(Value::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::transport::Credentials;
    use crate::test_utils::SqliteFixture;

    #[test]
    fn test_missing_database_is_connection_error() {
        let result = SqliteServer::start("/nonexistent/path/database.db");
        match result {
            Err(RowStreamError::Connection(msg)) => assert!(msg.contains("/nonexistent/path")),
            other => panic!("Expected Connection error, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_accepts_any_credentials() {
        let mut server = SqliteServer::start(MEMORY_ENDPOINT).unwrap();
        let reply = server
            .round_trip(Request::Handshake(Credentials::new("anyone", "anything")))
            .unwrap();
        assert!(matches!(reply, Reply::Ready));
    }

    #[test]
    fn test_query_all_returns_every_row() {
        let fixture = SqliteFixture::abc();
        let mut server = SqliteServer::start(fixture.endpoint()).unwrap();
        match server.round_trip(Request::QueryAll("SELECT * FROM items".to_string())).unwrap() {
            Reply::ResultSet(rs) => {
                assert_eq!(rs.columns, vec!["id", "name"]);
                assert_eq!(rs.rows.len(), 3);
                assert_eq!(rs.rows[2], vec![Value::Integer(3), Value::from("c")]);
            }
            other => panic!("Expected ResultSet, got {:?}", other),
        }
    }

    #[test]
    fn test_cursor_lookahead_and_busy() {
        let fixture = SqliteFixture::abc();
        let mut server = SqliteServer::start(fixture.endpoint()).unwrap();

        match server.round_trip(Request::Open("SELECT * FROM items".to_string())).unwrap() {
            Reply::Opened { columns, row, more } => {
                assert_eq!(columns, vec!["id", "name"]);
                assert_eq!(row, Some(vec![Value::Integer(1), Value::from("a")]));
                assert!(more);
            }
            other => panic!("Expected Opened, got {:?}", other),
        }

        let busy = server.round_trip(Request::QueryAll("SELECT 1".to_string()));
        assert!(matches!(busy, Err(RowStreamError::Busy)));

        assert!(matches!(
            server.round_trip(Request::Fetch).unwrap(),
            Reply::Fetched { more: true, .. }
        ));
        match server.round_trip(Request::Fetch).unwrap() {
            Reply::Fetched { row, more } => {
                assert_eq!(row, Some(vec![Value::Integer(3), Value::from("c")]));
                assert!(!more);
            }
            other => panic!("Expected Fetched, got {:?}", other),
        }

        // Cursor is gone; the server takes new queries again.
        assert!(matches!(
            server.round_trip(Request::QueryAll("SELECT 1".to_string())).unwrap(),
            Reply::ResultSet(_)
        ));
    }

    #[test]
    fn test_close_releases_cursor() {
        let fixture = SqliteFixture::abc();
        let mut server = SqliteServer::start(fixture.endpoint()).unwrap();
        server.round_trip(Request::Open("SELECT * FROM items".to_string())).unwrap();
        assert!(matches!(server.round_trip(Request::Close).unwrap(), Reply::Closed));
        assert!(matches!(
            server.round_trip(Request::Fetch),
            Err(RowStreamError::Query(_))
        ));
    }

    #[test]
    fn test_missing_table_is_query_error() {
        let mut server = SqliteServer::start(MEMORY_ENDPOINT).unwrap();
        for request in [
            Request::QueryAll("SELECT * FROM nonexistent_table".to_string()),
            Request::Open("SELECT * FROM nonexistent_table".to_string()),
        ] {
            match server.round_trip(request) {
                Err(RowStreamError::Query(msg)) => assert!(msg.contains("no such table")),
                other => panic!("Expected Query error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_non_database_file_is_connection_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"this is plain text, not a SQLite database file\n").unwrap();
        match SqliteServer::start(file.path().to_str().unwrap()) {
            Err(e) => assert!(e.is_connection(), "unexpected error: {}", e),
            Ok(_) => panic!("Expected Connection error"),
        }
    }

    #[test]
    fn test_read_failure_delivers_earlier_rows_first() {
        let fixture = SqliteFixture::new(&format!(
            "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), (2), ({});",
            i64::MIN
        ));
        let mut server = SqliteServer::start(fixture.endpoint()).unwrap();

        match server.round_trip(Request::Open("SELECT abs(x) AS a FROM t".to_string())).unwrap() {
            Reply::Opened { row, more, .. } => {
                assert_eq!(row, Some(vec![Value::Integer(1)]));
                assert!(more);
            }
            other => panic!("Expected Opened, got {:?}", other),
        }
        match server.round_trip(Request::Fetch).unwrap() {
            Reply::Fetched { row, more } => {
                assert_eq!(row, Some(vec![Value::Integer(2)]));
                assert!(more);
            }
            other => panic!("Expected Fetched, got {:?}", other),
        }
        match server.round_trip(Request::Fetch) {
            Err(RowStreamError::Query(msg)) => assert!(msg.contains("overflow")),
            other => panic!("Expected Query error, got {:?}", other),
        }

        // The failed cursor is gone.
        assert!(matches!(
            server.round_trip(Request::QueryAll("SELECT 1".to_string())).unwrap(),
            Reply::ResultSet(_)
        ));
    }

    #[test]
    fn test_read_failure_on_second_row_still_opens() {
        let fixture = SqliteFixture::new(&format!(
            "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), ({});",
            i64::MIN
        ));
        let mut server = SqliteServer::start(fixture.endpoint()).unwrap();

        match server.round_trip(Request::Open("SELECT abs(x) AS a FROM t".to_string())).unwrap() {
            Reply::Opened { row, more, .. } => {
                assert_eq!(row, Some(vec![Value::Integer(1)]));
                assert!(more);
            }
            other => panic!("Expected Opened, got {:?}", other),
        }
        assert!(matches!(server.round_trip(Request::Fetch), Err(RowStreamError::Query(_))));
    }
}
