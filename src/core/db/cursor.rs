/// Cursor Module
///
/// Row cursors produced by [`stream`](super::reader::stream). A buffered
/// cursor owns the complete result set and walks it locally. An unbuffered
/// cursor pulls one row per round trip and keeps the connection busy until
/// it is exhausted, closed or dropped.

use super::connection::Connection;
use super::reader::BufferingPolicy;
use super::transport::{unexpected_reply, Reply, Request, ResultSet};
use super::value::{Row, Value};
use crate::core::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// A cursor over the rows of one query
#[derive(Debug)]
pub enum RowCursor<'c> {
    Buffered(BufferedCursor),
    Unbuffered(UnbufferedCursor<'c>),
}

impl<'c> RowCursor<'c> {
    /// Returns the next row, or `None` once the result set is exhausted.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        match self {
            RowCursor::Buffered(cursor) => Ok(cursor.next_row()),
            RowCursor::Unbuffered(cursor) => cursor.next_row(),
        }
    }

    pub fn policy(&self) -> BufferingPolicy {
        match self {
            RowCursor::Buffered(_) => BufferingPolicy::Buffered,
            RowCursor::Unbuffered(_) => BufferingPolicy::Unbuffered,
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            RowCursor::Buffered(cursor) => cursor.columns(),
            RowCursor::Unbuffered(cursor) => cursor.columns(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            RowCursor::Buffered(cursor) => cursor.position() >= cursor.len(),
            RowCursor::Unbuffered(cursor) => cursor.is_exhausted(),
        }
    }

    /// Discards the cursor, releasing the connection if it is still busy.
    pub fn close(self) -> Result<()> {
        match self {
            RowCursor::Buffered(_) => Ok(()),
            RowCursor::Unbuffered(cursor) => cursor.close(),
        }
    }
}

impl Iterator for RowCursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// A fully materialized result set with a movable position
#[derive(Debug, Clone)]
pub struct BufferedCursor {
    columns: Arc<[String]>,
    rows: Vec<Row>,
    position: usize,
}

impl BufferedCursor {
    pub(crate) fn new(result_set: ResultSet) -> Self {
        let columns: Arc<[String]> = result_set.columns.into();
        let rows = result_set
            .rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        BufferedCursor {
            columns,
            rows,
            position: 0,
        }
    }

    pub fn next_row(&mut self) -> Option<Row> {
        let row = self.rows.get(self.position).cloned()?;
        self.position += 1;
        Some(row)
    }

    /// Moves back one row and returns it, so `next_row` followed by
    /// `previous` yields the same row twice.
    pub fn previous(&mut self) -> Option<Row> {
        if self.position == 0 {
            return None;
        }
        self.position -= 1;
        self.rows.get(self.position).cloned()
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Positions the cursor so the next row returned is `index`. Clamped to the end.
    pub fn seek(&mut self, index: usize) {
        self.position = index.min(self.rows.len());
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// A forward-only, single-pass cursor backed by a server-side cursor
#[derive(Debug)]
pub struct UnbufferedCursor<'c> {
    conn: &'c Connection,
    columns: Arc<[String]>,
    // Row that arrived with the open reply and has not been handed out yet.
    pending: Option<Row>,
    // The server still holds rows for this cursor.
    more: bool,
}

impl<'c> UnbufferedCursor<'c> {
    pub(crate) fn open(
        conn: &'c Connection,
        columns: Vec<String>,
        first: Option<Vec<Value>>,
        more: bool,
    ) -> Self {
        let columns: Arc<[String]> = columns.into();
        let pending = first.map(|values| Row::new(Arc::clone(&columns), values));
        conn.set_busy(more);
        UnbufferedCursor {
            conn,
            columns,
            pending,
            more,
        }
    }

    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.pending.take() {
            return Ok(Some(row));
        }
        if !self.more {
            return Ok(None);
        }

        let reply = self.conn.round_trip(Request::Fetch);
        let (values, more) = match reply {
            Ok(Reply::Fetched { row, more }) => (row, more),
            Ok(other) => {
                self.finish();
                return Err(unexpected_reply("fetch", &other));
            }
            Err(e) => {
                self.finish();
                return Err(e);
            }
        };

        if !more || values.is_none() {
            self.finish();
        }
        Ok(values.map(|values| Row::new(Arc::clone(&self.columns), values)))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_none() && !self.more
    }

    /// Closes the server-side cursor if it is still open.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        self.pending = None;
        if !self.more {
            return Ok(());
        }
        self.finish();
        debug!("closing unbuffered cursor early");
        match self.conn.round_trip(Request::Close)? {
            Reply::Closed => Ok(()),
            other => Err(unexpected_reply("close", &other)),
        }
    }

    fn finish(&mut self) {
        self.more = false;
        self.conn.set_busy(false);
    }
}

impl Drop for UnbufferedCursor<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to close unbuffered cursor on {}: {}", self.conn.endpoint(), e);
        }
    }
}
