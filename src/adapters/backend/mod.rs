//! Backend abstraction layer
//!
//! This module provides a trait-based abstraction over table storage, allowing
//! QQQ to serve tables from different backends through one action surface.

pub mod factory;
pub mod traits;

pub use factory::{create_backend, create_backends};
pub use traits::{
    BackendModule, BackendTransaction, DeleteInput, DeleteOutput, LoadTransaction, QueryHint,
    QueryInput, QueryOutput,
};
