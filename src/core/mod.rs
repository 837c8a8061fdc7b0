//! Core logic of QQQ
//!
//! # Modules
//!
//! - [`instance`] - Runtime registry of backends, tables and processes
//! - [`actions`] - Table actions (get, query, count, insert, update, delete)
//! - [`cache`] - Cache-table read-through and unique-key lookups
//! - [`pipe`] - Bounded record pipe and its producer/consumer loop
//! - [`etl`] - Streamed extract/transform/load processes
//!
//! # Example
//!
//! ```rust,no_run
//! use qqq::config::load_config;
//! use qqq::core::etl::{StepRegistry, StreamedEtlProcess};
//! use qqq::core::QqqInstance;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("qqq.toml")?;
//! let instance = Arc::new(QqqInstance::from_config(&config).await?);
//!
//! let process = StreamedEtlProcess::new(instance, "copyPeople", &StepRegistry::default())?;
//! let mut state = process.new_state();
//! process.run(&mut state).await?;
//! process.resume(&mut state).await?;
//!
//! println!("{:?}", state.values().get("processSummary"));
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod cache;
pub mod etl;
pub mod instance;
pub mod pipe;

pub use instance::QqqInstance;
