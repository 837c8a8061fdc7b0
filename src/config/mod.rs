//! Configuration management for QQQ.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! QQQ uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `QQQ_*` environment variable overrides
//! - Default values for optional settings
//! - Validation of every cross-reference (tables → backends, caches → sources,
//!   processes → tables)
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Application settings (name, log level)
//! - [`EtlConfig`] - Page size, preview limit, pipe capacity
//! - [`CacheConfig`] - Existence-check paging for cache tables
//! - [`LoggingConfig`] - Logging configuration
//! - [`BackendConfig`] - Storage backends
//! - [`ProcessConfig`] - Streamed ETL process definitions
//!
//! Tables are declared with [`crate::domain::TableMetaData`] directly.
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! name = "qqq"
//! log_level = "info"
//!
//! [[backends]]
//! name = "memory"
//! type = "memory"
//! seed_file = "${QQQ_SEED_FILE}"
//!
//! [[tables]]
//! name = "person"
//! backend_name = "memory"
//! fields = [{ name = "email", type = "string" }]
//! unique_keys = [{ fields = ["email"] }]
//!
//! [[processes]]
//! name = "archivePeople"
//! source_table = "person"
//! destination_table = "personArchive"
//! load_code = "insert_or_update"
//! ```
//!
//! # Validation
//!
//! Configuration is validated on load:
//!
//! ```rust,no_run
//! use qqq::config::load_config;
//!
//! # fn example() {
//! match load_config("qqq.toml") {
//!     Ok(config) => println!("Configuration valid"),
//!     Err(e) => eprintln!("Configuration error: {}", e),
//! }
//! # }
//! ```

pub mod loader;
pub mod schema;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, BackendConfig, CacheConfig, EtlConfig, LoggingConfig, ProcessConfig,
    QqqConfig,
};
