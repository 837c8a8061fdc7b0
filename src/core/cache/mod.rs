//! Cache tables
//!
//! A cache table mirrors rows of a source table, each stamped with the time it
//! was cached. The resolver serves lookups against cache tables; [`unique_key`]
//! answers which unique-key tuples already exist in a table.

pub(crate) mod resolver;
pub mod unique_key;

pub use unique_key::{get_existing_keys, unique_key_errors};
