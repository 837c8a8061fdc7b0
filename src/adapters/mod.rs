//! Storage integrations for QQQ.
//!
//! This module provides the backend action surface and its implementations:
//!
//! - [`backend`] - Backend abstraction layer (trait-based) and factory
//! - [`memory`] - In-memory backend with snapshot transactions
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate storage from the core.
//! Actions, the cache decorator and the ETL engine only ever talk to a
//! [`backend::BackendModule`] trait object.
//!
//! ```rust
//! use qqq::adapters::backend::{BackendModule, LoadTransaction};
//! use qqq::adapters::memory::MemoryBackend;
//! use qqq::domain::{Record, TableMetaData};
//! use std::sync::Arc;
//!
//! # async fn example() -> qqq::domain::Result<()> {
//! let backend: Arc<dyn BackendModule> = Arc::new(MemoryBackend::new("memory"));
//! let table = TableMetaData::new("shape", "memory");
//!
//! let transaction = backend.open_transaction(&table).await?;
//! backend.insert(&table, vec![Record::new().with_value("name", "Square")], &transaction).await?;
//! transaction.commit().await?;
//! transaction.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod memory;
