//! Transaction guard over any [`SqlExecutor`]
//!
//! Recording a verified version touches two places, the version-record
//! procedure and the audit table, and both writes must land together. A
//! [`Transaction`] issues `BEGIN` on creation. It must be finished with
//! [`Transaction::commit`]. Dropping it unfinished issues `ROLLBACK`.

use crate::executor::{DbError, SqlExecutor, SqlParams};
use crate::row::ResultRow;
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// Statement failure inside the transaction
    Database(DbError),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Database(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<DbError> for TransactionError {
    fn from(err: DbError) -> Self {
        TransactionError::Database(err)
    }
}

/// An open transaction on a borrowed executor
pub struct Transaction<'a> {
    executor: &'a dyn SqlExecutor,
    closed: bool,
}

impl<'a> Transaction<'a> {
    /// Start a transaction
    ///
    /// # Errors
    ///
    /// Returns `TransactionError` if `BEGIN` fails.
    pub fn begin(executor: &'a dyn SqlExecutor) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        executor.execute("BEGIN", &[])?;
        Ok(Self {
            executor,
            closed: false,
        })
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if `COMMIT` fails. The guard then counts as closed and
    /// does not attempt a rollback on drop; the server has already aborted
    /// the transaction.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        self.closed = true;
        self.executor.execute("COMMIT", &[])?;
        Ok(())
    }
}

impl SqlExecutor for Transaction<'_> {
    fn execute(&self, query: &str, params: SqlParams<'_>) -> Result<u64, DbError> {
        self.executor.execute(query, params)
    }

    fn query_all(&self, query: &str, params: SqlParams<'_>) -> Result<Vec<ResultRow>, DbError> {
        self.executor.query_all(query, params)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.executor.execute("ROLLBACK", &[]) {
                log::warn!("rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}
