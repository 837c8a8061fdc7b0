//! Domain models and types for QQQ.
//!
//! This module contains the core domain types shared by every layer: records and
//! their values, query filters, table metadata and the error hierarchy.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Records** ([`Record`], [`Value`], [`KeyTuple`])
//! - **Query filters** ([`QueryFilter`], [`FilterCriteria`], [`Operator`])
//! - **Table metadata** ([`TableMetaData`], [`UniqueKey`], [`CacheOf`], [`CacheUseCase`])
//! - **Error types** ([`QqqError`], [`BackendError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, QqqError>`]:
//!
//! ```rust
//! use qqq::domain::{QueryFilter, Result};
//!
//! fn example() -> Result<()> {
//!     // Errors are automatically converted using the ? operator
//!     let filter = QueryFilter::from_json_str(r#"{"criteria": []}"#)?;
//!     assert!(filter.has_no_conditions());
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

pub mod errors;
pub mod filter;
pub mod record;
pub mod result;
pub mod table;

// Re-export commonly used types for convenience
pub use errors::{BackendError, QqqError};
pub use filter::{BooleanOperator, FilterCriteria, Operator, OrderBy, QueryFilter};
pub use record::{KeyTuple, Record, RecordMessage, Value};
pub use result::Result;
pub use table::{
    CacheOf, CacheUseCase, FieldMetaData, FieldType, PossibleValue, TableMetaData, UniqueKey,
};
