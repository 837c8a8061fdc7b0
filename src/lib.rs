// QQQ - Table actions, cache tables and streamed ETL
// Copyright (c) 2025 QQQ Contributors
// Licensed under the MIT License

//! # QQQ - Table actions, cache tables and streamed ETL
//!
//! QQQ reads and writes records in tables declared by metadata, serves lookups
//! against cache tables that mirror a slower source table, and moves records
//! between tables with streamed extract/transform/load processes.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Table actions**: get, query, count, insert, update and delete by table name
//! - **Cache tables**: read-through lookups by unique key, refreshed from the
//!   source table once rows expire
//! - **Unique keys**: batched existence checks and duplicate detection on insert
//! - **Streamed ETL**: preview, optional full validation and a transactional
//!   execute, with records flowing through a bounded pipe
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Instance, actions, cache resolver, record pipe and ETL processes
//! - [`adapters`] - Backend module trait and the in-memory backend
//! - [`domain`] - Records, filters, table metadata and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qqq::config::load_config;
//! use qqq::core::etl::{StepRegistry, StreamedEtlProcess};
//! use qqq::core::QqqInstance;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("qqq.toml")?;
//!     let instance = Arc::new(QqqInstance::from_config(&config).await?);
//!
//!     let process = StreamedEtlProcess::new(instance, "copyPeople", &StepRegistry::default())?;
//!     let mut state = process.new_state();
//!
//!     process.run(&mut state).await?; // preview, then stop for review
//!     process.resume(&mut state).await?; // execute
//!     Ok(())
//! }
//! ```
//!
//! ## Cache Tables
//!
//! A query on a cache table by one of its unique keys is answered from the cache
//! while rows are fresh. Missing or expired keys are fetched from the source
//! table, written back, and returned in one result:
//!
//! ```rust,no_run
//! use qqq::adapters::backend::{QueryInput, QueryOutput};
//! use qqq::core::{actions, QqqInstance};
//! use qqq::domain::{FilterCriteria, QueryFilter};
//!
//! # async fn example(instance: &QqqInstance) -> qqq::domain::Result<()> {
//! let filter = QueryFilter::new().with_criteria(FilterCriteria::equals("email", "tim@example.com"));
//! let mut output = QueryOutput::list();
//! actions::query(instance, "personCache", &QueryInput::new(filter), &mut output).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Fatal failures are returned as [`domain::QqqError`]. Per-record problems
//! (a duplicate unique key, a missing row) are attached to the record itself and
//! counted in the process summary:
//!
//! ```rust
//! use qqq::domain::Record;
//!
//! let mut record = Record::new().with_value("email", "tim@example.com");
//! record.add_error("Another record already exists with this Email");
//! assert!(record.has_errors());
//! ```
//!
//! ## Logging
//!
//! QQQ uses structured logging with the `tracing` crate; see [`logging`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
