//! Backend abstraction traits
//!
//! This module defines the action surface every storage backend implements, and
//! the input/output types that flow across it.

use crate::core::pipe::RecordPipe;
use crate::domain::filter::QueryFilter;
use crate::domain::record::{Record, Value};
use crate::domain::table::TableMetaData;
use crate::domain::Result;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

/// Hints that change how a query is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryHint {
    /// Read a cache table as a plain table: never fall through to its source table
    DoNotQuerySourceTable,
}

/// Input to a query
#[derive(Debug, Clone, Default)]
pub struct QueryInput<'a> {
    /// Filter (with ordering and paging)
    pub filter: QueryFilter,

    /// Hints
    pub hints: HashSet<QueryHint>,

    /// Open transaction to read through, if any
    pub transaction: Option<&'a LoadTransaction>,
}

impl<'a> QueryInput<'a> {
    /// Create a query input for a filter
    pub fn new(filter: QueryFilter) -> Self {
        Self {
            filter,
            hints: HashSet::new(),
            transaction: None,
        }
    }

    /// Builder: add a hint
    pub fn with_hint(mut self, hint: QueryHint) -> Self {
        self.hints.insert(hint);
        self
    }

    /// Builder: read through a transaction
    pub fn with_transaction(mut self, transaction: &'a LoadTransaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Whether a hint is present
    pub fn has_hint(&self, hint: QueryHint) -> bool {
        self.hints.contains(&hint)
    }
}

/// Where query results go
#[derive(Debug)]
enum OutputSink {
    List(Vec<Record>),
    Pipe(Arc<RecordPipe>),
}

/// Destination of a query's records: either collected in memory or streamed
/// into a [`RecordPipe`]
#[derive(Debug)]
pub struct QueryOutput {
    sink: OutputSink,
    count: usize,
}

impl QueryOutput {
    /// Collect results in a list
    pub fn list() -> Self {
        Self {
            sink: OutputSink::List(Vec::new()),
            count: 0,
        }
    }

    /// Stream results into a pipe
    pub fn pipe(pipe: Arc<RecordPipe>) -> Self {
        Self {
            sink: OutputSink::Pipe(pipe),
            count: 0,
        }
    }

    /// Emit one record
    ///
    /// # Errors
    ///
    /// Fails with [`crate::domain::QqqError::PipeTerminated`] when streaming into a
    /// terminated pipe.
    pub async fn add_record(&mut self, record: Record) -> Result<()> {
        match &mut self.sink {
            OutputSink::List(records) => records.push(record),
            OutputSink::Pipe(pipe) => pipe.add_record(record).await?,
        }
        self.count += 1;
        Ok(())
    }

    /// Emit several records in order
    pub async fn add_records(&mut self, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.add_record(record).await?;
        }
        Ok(())
    }

    /// Number of records emitted so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether records are streamed into a pipe
    pub fn is_pipe(&self) -> bool {
        matches!(self.sink, OutputSink::Pipe(_))
    }

    /// Records collected by a list output (empty for a pipe output)
    pub fn into_records(self) -> Vec<Record> {
        match self.sink {
            OutputSink::List(records) => records,
            OutputSink::Pipe(_) => Vec::new(),
        }
    }
}

/// What to delete
#[derive(Debug, Clone)]
pub enum DeleteInput {
    /// Delete the rows with these primary keys
    PrimaryKeys(Vec<Value>),
    /// Delete every row matching this filter
    Filter(QueryFilter),
}

/// Result of a delete
#[derive(Debug, Clone, Default)]
pub struct DeleteOutput {
    /// Number of rows deleted
    pub deleted_count: usize,

    /// One record (holding only the primary key) per row that could not be deleted
    pub records_with_errors: Vec<Record>,

    /// Records deleted, but with a warning attached
    pub records_with_warnings: Vec<Record>,
}

/// An open backend transaction
///
/// Implementations are owned by exactly one [`LoadTransaction`] and closed
/// exactly once through [`LoadTransaction::close`].
#[async_trait]
pub trait BackendTransaction: Send + Sync {
    /// Identifier, for logs
    fn id(&self) -> &str;

    /// Make the transaction's writes permanent
    async fn commit(&self) -> Result<()>;

    /// Discard the transaction's writes
    async fn rollback(&self) -> Result<()>;

    /// Release the transaction's resources
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A transaction that may or may not exist, depending on backend support
///
/// Every load step has to branch on this explicitly.
pub enum LoadTransaction {
    /// The backend opened a transaction
    Open(Box<dyn BackendTransaction>),
    /// The backend does not support transactions; writes apply immediately
    Unsupported,
}

impl LoadTransaction {
    /// Whether a real transaction is open
    pub fn is_open(&self) -> bool {
        matches!(self, LoadTransaction::Open(_))
    }

    /// Commit, if a transaction is open
    pub async fn commit(&self) -> Result<()> {
        match self {
            LoadTransaction::Open(transaction) => {
                tracing::debug!(transaction_id = transaction.id(), "Committing transaction");
                transaction.commit().await
            }
            LoadTransaction::Unsupported => Ok(()),
        }
    }

    /// Roll back, if a transaction is open
    pub async fn rollback(&self) -> Result<()> {
        match self {
            LoadTransaction::Open(transaction) => {
                tracing::warn!(transaction_id = transaction.id(), "Rolling back transaction");
                transaction.rollback().await
            }
            LoadTransaction::Unsupported => Ok(()),
        }
    }

    /// Close, consuming the transaction
    pub async fn close(self) -> Result<()> {
        match self {
            LoadTransaction::Open(transaction) => {
                tracing::debug!(transaction_id = transaction.id(), "Closing transaction");
                transaction.close().await
            }
            LoadTransaction::Unsupported => Ok(()),
        }
    }
}

impl std::fmt::Debug for LoadTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadTransaction::Open(transaction) => {
                f.debug_tuple("Open").field(&transaction.id()).finish()
            }
            LoadTransaction::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// Backend module trait
///
/// This trait defines the actions that every storage backend implements. Table
/// metadata is passed with every call so a backend can serve any number of tables.
/// Per-record failures (unique-key clashes, missing rows) are attached to the
/// returned records; only failures of the whole call are returned as errors.
#[async_trait]
pub trait BackendModule: Send + Sync {
    /// Downcast to Any for type-specific operations
    ///
    /// This allows reaching backend-specific diagnostics (e.g. the memory
    /// backend's operation statistics) through the trait object.
    fn as_any(&self) -> &dyn Any;

    /// Backend type (e.g. `memory`)
    fn backend_type(&self) -> &str;

    /// Run a query, emitting matching records into `output`
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unknown to the backend, or if a streamed
    /// output's pipe was terminated.
    async fn query(
        &self,
        table: &TableMetaData,
        input: &QueryInput<'_>,
        output: &mut QueryOutput,
    ) -> Result<()>;

    /// Count the records matching a filter (ordering and paging ignored)
    async fn count(&self, table: &TableMetaData, filter: &QueryFilter) -> Result<usize>;

    /// Insert records, returning them with assigned primary keys and any errors
    async fn insert(
        &self,
        table: &TableMetaData,
        records: Vec<Record>,
        transaction: &LoadTransaction,
    ) -> Result<Vec<Record>>;

    /// Update records by primary key, returning them with any errors
    async fn update(
        &self,
        table: &TableMetaData,
        records: Vec<Record>,
        transaction: &LoadTransaction,
    ) -> Result<Vec<Record>>;

    /// Delete records
    async fn delete(
        &self,
        table: &TableMetaData,
        input: DeleteInput,
        transaction: &LoadTransaction,
    ) -> Result<DeleteOutput>;

    /// Open a transaction on a table
    ///
    /// Backends without transaction support keep the default, which returns
    /// [`LoadTransaction::Unsupported`].
    async fn open_transaction(&self, table: &TableMetaData) -> Result<LoadTransaction> {
        tracing::debug!(
            table = %table.name,
            backend_type = self.backend_type(),
            "Backend does not support transactions"
        );
        Ok(LoadTransaction::Unsupported)
    }
}
