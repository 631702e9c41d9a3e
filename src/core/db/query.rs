/// Query Module
///
/// A `Query` is an immutable, validated read command. Validation happens on
/// the client before anything is sent to the server, so a rejected query
/// never costs a round trip.

use crate::core::{Result, RowStreamError};
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

/// An immutable read command plus the table it targets, if known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    sql: String,
    table: Option<String>,
}

impl Query {
    /// Creates a query from caller-supplied SQL.
    ///
    /// # Errors
    ///
    /// Returns `RowStreamError::Query` if the text is empty, does not parse,
    /// holds more than one statement, or is not a read query.
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        validate_read_query(&sql)?;
        Ok(Query { sql, table: None })
    }

    /// Builds `SELECT * FROM "<table>"` for the given table name.
    ///
    /// # Examples
    ///
    /// ```
    /// use rowstream::core::db::Query;
    ///
    /// let query = Query::select_all("users").unwrap();
    /// assert_eq!(query.sql(), r#"SELECT * FROM "users""#);
    /// ```
    pub fn select_all(table: &str) -> Result<Self> {
        if table.trim().is_empty() {
            return Err(RowStreamError::Query("Table name must not be empty".to_string()));
        }
        // Built from a quoted identifier, so it is always a single SELECT.
        Ok(Query {
            sql: format!("SELECT * FROM {}", quote_identifier(table)),
            table: Some(table.to_string()),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }
}

/// Quotes an identifier for SQLite, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn validate_read_query(sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(RowStreamError::Query(
            "Cannot execute empty SQL query - please provide a valid SQL statement".to_string(),
        ));
    }

    let statements = Parser::parse_sql(&SQLiteDialect {}, sql)
        .map_err(|e| RowStreamError::Query(format!("Failed to parse statement: {}", e)))?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [_] => Err(RowStreamError::Query(format!("Not a read query: {}", sql.trim()))),
        [] => Err(RowStreamError::Query("No statement found".to_string())),
        many => Err(RowStreamError::Query(format!(
            "Expected a single statement, found {}",
            many.len()
        ))),
    }
}
