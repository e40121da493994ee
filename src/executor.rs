//! SQL execution seam
//!
//! [`SqlExecutor`] is the single trait every database operation in this crate
//! goes through: verification scripts, the version-record procedure, audit
//! inserts and status reads. [`PostgresExecutor`] implements it over a
//! `may_postgres::Client`. Tests substitute an in-memory implementation from
//! `test_helpers`.

use crate::row::ResultRow;
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Query parameter slice accepted by [`SqlExecutor`]
pub type SqlParams<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Database execution error
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::PostgresError(e) => {
                write!(f, "PostgreSQL error: {e}")
            }
            DbError::QueryError(s) => {
                write!(f, "Query error: {s}")
            }
            DbError::ParseError(s) => {
                write!(f, "Parse error: {s}")
            }
            DbError::Other(s) => {
                write!(f, "Execution error: {s}")
            }
        }
    }
}

impl std::error::Error for DbError {}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::PostgresError(err)
    }
}

/// Trait for executing SQL against the schema database
///
/// Implementations run each call as one blocking round trip. Within a `may`
/// coroutine the call parks the coroutine rather than the worker thread.
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, query: &str, params: SqlParams<'_>) -> Result<u64, DbError>;

    /// Execute a query and return every row
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_all(&self, query: &str, params: SqlParams<'_>) -> Result<Vec<ResultRow>, DbError>;
}

/// [`SqlExecutor`] over a `may_postgres::Client`
pub struct PostgresExecutor {
    client: Client,
}

impl PostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl SqlExecutor for PostgresExecutor {
    fn execute(&self, query: &str, params: SqlParams<'_>) -> Result<u64, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();

        let start = Instant::now();
        let result = self.client.execute(query, params).map_err(DbError::PostgresError);

        #[cfg(feature = "metrics")]
        METRICS.record_query(start.elapsed(), result.is_ok());
        log::trace!("execute finished in {:?}: {}", start.elapsed(), query.trim());

        result
    }

    fn query_all(&self, query: &str, params: SqlParams<'_>) -> Result<Vec<ResultRow>, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();

        let start = Instant::now();
        let result = self
            .client
            .query(query, params)
            .map(|rows| rows.iter().map(ResultRow::from_pg_row).collect())
            .map_err(DbError::PostgresError);

        #[cfg(feature = "metrics")]
        METRICS.record_query(start.elapsed(), result.is_ok());
        log::trace!("query finished in {:?}: {}", start.elapsed(), query.trim());

        result
    }
}

/// Query a single optional text value from the first column of the first row
///
/// Returns `Ok(None)` when the query yields no rows or a SQL `NULL`.
///
/// # Errors
///
/// Returns `DbError::ParseError` when the value is present but not text.
pub fn query_text(
    executor: &dyn SqlExecutor,
    sql: &str,
    params: SqlParams<'_>,
) -> Result<Option<String>, DbError> {
    let rows = executor.query_all(sql, params)?;
    match rows.first().and_then(|row| row.get_index(0)) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(DbError::ParseError(format!("expected text value, found {other}"))),
    }
}
