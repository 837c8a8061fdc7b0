//! Snapshot transactions for the memory backend
//!
//! Opening a transaction snapshots one table; rolling back restores it. Writes
//! are applied to the live table as they happen.

use crate::adapters::backend::traits::BackendTransaction;
use crate::adapters::memory::backend::{MemoryTable, MemoryTables};
use crate::domain::{BackendError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Transaction lifecycle counters
#[derive(Debug, Default)]
pub struct TransactionStatistics {
    opened: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    closed: AtomicUsize,
}

impl TransactionStatistics {
    /// Transactions opened
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Transactions committed
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    /// Transactions rolled back
    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    /// Transactions closed
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum Snapshot {
    /// Table contents at open (`None` if the table did not exist yet)
    Pending(Option<MemoryTable>),
    /// Committed or rolled back
    Resolved,
}

/// Transaction over one memory table
#[derive(Debug)]
pub struct MemoryTransaction {
    id: String,
    table_name: String,
    snapshot: Mutex<Snapshot>,
    tables: MemoryTables,
    statistics: Arc<TransactionStatistics>,
}

impl MemoryTransaction {
    pub(crate) fn new(
        id: String,
        table_name: String,
        snapshot: Option<MemoryTable>,
        tables: MemoryTables,
        statistics: Arc<TransactionStatistics>,
    ) -> Self {
        statistics.opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(transaction_id = %id, table = %table_name, "Opened memory transaction");

        Self {
            id,
            table_name,
            snapshot: Mutex::new(Snapshot::Pending(snapshot)),
            tables,
            statistics,
        }
    }

    fn take_snapshot(&self) -> Snapshot {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *snapshot, Snapshot::Resolved)
    }
}

#[async_trait]
impl BackendTransaction for MemoryTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn commit(&self) -> Result<()> {
        match self.take_snapshot() {
            Snapshot::Pending(_) => {
                self.statistics.committed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Snapshot::Resolved => Err(BackendError::Transaction(format!(
                "Transaction {} was already committed or rolled back",
                self.id
            ))
            .into()),
        }
    }

    async fn rollback(&self) -> Result<()> {
        self.statistics.rolled_back.fetch_add(1, Ordering::SeqCst);

        match self.take_snapshot() {
            Snapshot::Pending(snapshot) => {
                let mut tables = self.tables.write().await;
                match snapshot {
                    Some(table) => {
                        tables.insert(self.table_name.clone(), table);
                    }
                    None => {
                        tables.remove(&self.table_name);
                    }
                }
                tracing::debug!(transaction_id = %self.id, table = %self.table_name, "Restored table snapshot");
                Ok(())
            }
            // nothing left to undo once committed
            Snapshot::Resolved => Ok(()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.statistics.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::backend::{BackendModule, LoadTransaction};
    use crate::adapters::memory::MemoryBackend;
    use crate::domain::{FieldType, QueryFilter, Record, TableMetaData};

    fn table() -> TableMetaData {
        TableMetaData::new("shape", "memory").with_field("name", FieldType::String)
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let backend = MemoryBackend::new("memory");
        let table = table();
        backend
            .insert(&table, vec![Record::new().with_value("name", "Square")], &LoadTransaction::Unsupported)
            .await
            .unwrap();

        let tx = backend.open_transaction(&table).await.unwrap();
        assert!(tx.is_open());
        backend
            .insert(&table, vec![Record::new().with_value("name", "Circle")], &tx)
            .await
            .unwrap();
        assert_eq!(backend.count(&table, &QueryFilter::new()).await.unwrap(), 2);

        tx.rollback().await.unwrap();
        tx.close().await.unwrap();

        assert_eq!(backend.count(&table, &QueryFilter::new()).await.unwrap(), 1);
        let stats = backend.transaction_statistics();
        assert_eq!(stats.opened(), 1);
        assert_eq!(stats.rolled_back(), 1);
        assert_eq!(stats.committed(), 0);
        assert_eq!(stats.closed(), 1);
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let backend = MemoryBackend::new("memory");
        let table = table();

        let tx = backend.open_transaction(&table).await.unwrap();
        backend
            .insert(&table, vec![Record::new().with_value("name", "Triangle")], &tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(tx.commit().await.is_err());
        tx.rollback().await.unwrap();
        tx.close().await.unwrap();

        assert_eq!(backend.rows("shape").await.len(), 1);
        assert_eq!(backend.transaction_statistics().committed(), 1);
    }
}
