/// # Test Utilities Module
///
/// Shared fixtures for unit tests:
/// - `SqliteFixture`: a throwaway SQLite database file to point a server at
/// - `MockTransport`: an in-process server over a fixed result set that
///   records every request it receives

use crate::core::db::{Credentials, Reply, Request, ResultSet, Transport, Value};
use crate::core::{Result, RowStreamError};
use rusqlite::Connection;
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::NamedTempFile;

/// A SQLite database file that lives as long as the fixture
pub struct SqliteFixture {
    file: NamedTempFile,
}

impl SqliteFixture {
    /// Creates a database file and runs `setup_sql` against it.
    pub fn new(setup_sql: &str) -> Self {
        let file = NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(setup_sql).unwrap();
        SqliteFixture { file }
    }

    /// `items(id, name)` holding `(1, 'a')`, `(2, 'b')`, `(3, 'c')`.
    pub fn abc() -> Self {
        SqliteFixture::new(
            "
            CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);
            INSERT INTO items (id, name) VALUES (1, 'a');
            INSERT INTO items (id, name) VALUES (2, 'b');
            INSERT INTO items (id, name) VALUES (3, 'c');
        ",
        )
    }

    /// `items(id, name)` with no rows.
    pub fn empty() -> Self {
        SqliteFixture::new("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);")
    }

    pub fn endpoint(&self) -> &str {
        self.file.path().to_str().unwrap()
    }
}

/// The three-row `items` result set used throughout the tests
pub fn abc_result_set() -> ResultSet {
    ResultSet {
        columns: vec!["id".to_string(), "name".to_string()],
        rows: vec![
            vec![Value::Integer(1), Value::from("a")],
            vec![Value::Integer(2), Value::from("b")],
            vec![Value::Integer(3), Value::from("c")],
        ],
    }
}

/// Scripted server serving one result set for every query
pub struct MockTransport {
    table: ResultSet,
    accepted: Option<Credentials>,
    cursor: Option<usize>,
    fail_on_fetch: Option<usize>,
    fetches: usize,
    log: Rc<RefCell<Vec<Request>>>,
}

impl MockTransport {
    pub fn new(table: ResultSet) -> Self {
        MockTransport {
            table,
            accepted: None,
            cursor: None,
            fail_on_fetch: None,
            fetches: 0,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Only these credentials pass the handshake.
    pub fn requiring(mut self, credentials: Credentials) -> Self {
        self.accepted = Some(credentials);
        self
    }

    /// The `nth` fetch (counted from 1) fails and discards the cursor.
    pub fn failing_on_fetch(mut self, nth: usize) -> Self {
        self.fail_on_fetch = Some(nth);
        self
    }

    /// Shared view of every request received so far.
    pub fn log(&self) -> Rc<RefCell<Vec<Request>>> {
        Rc::clone(&self.log)
    }

    fn row_at(&self, index: usize) -> (Option<Vec<Value>>, bool) {
        let row = self.table.rows.get(index).cloned();
        (row, index + 1 < self.table.rows.len())
    }
}

impl Transport for MockTransport {
    fn round_trip(&mut self, request: Request) -> Result<Reply> {
        self.log.borrow_mut().push(request.clone());

        if let Some(position) = self.cursor {
            return match request {
                Request::Fetch => {
                    self.fetches += 1;
                    if self.fail_on_fetch == Some(self.fetches) {
                        self.cursor = None;
                        return Err(RowStreamError::Query("disk I/O error".to_string()));
                    }
                    let (row, more) = self.row_at(position);
                    self.cursor = if more { Some(position + 1) } else { None };
                    Ok(Reply::Fetched { row, more })
                }
                Request::Close => {
                    self.cursor = None;
                    Ok(Reply::Closed)
                }
                _ => Err(RowStreamError::Busy),
            };
        }

        match request {
            Request::Handshake(credentials) => match &self.accepted {
                Some(accepted) if *accepted != credentials => Err(RowStreamError::Connection(
                    format!("Access denied for user '{}'", credentials.username),
                )),
                _ => Ok(Reply::Ready),
            },
            Request::QueryAll(sql) | Request::Open(sql) if sql.contains("missing") => {
                Err(RowStreamError::Query("no such table: missing".to_string()))
            }
            Request::QueryAll(_) => Ok(Reply::ResultSet(self.table.clone())),
            Request::Open(_) => {
                let (row, more) = self.row_at(0);
                if more {
                    self.cursor = Some(1);
                }
                Ok(Reply::Opened {
                    columns: self.table.columns.clone(),
                    row,
                    more,
                })
            }
            Request::Fetch | Request::Close => Err(RowStreamError::Query("No open cursor".to_string())),
        }
    }
}
