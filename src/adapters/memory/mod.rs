//! In-memory backend
//!
//! Used for tests, demos and as the default backend of a fresh `qqq init`
//! configuration. Rows live in a `tokio::sync::RwLock`-guarded map per table.

pub mod backend;
pub mod transaction;

pub use backend::{MemoryBackend, TableStatistics};
pub use transaction::{MemoryTransaction, TransactionStatistics};
