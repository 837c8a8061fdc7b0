//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Console output with configurable log levels
//! - Local JSON file logging with rotation
//! - Helper macros for the events every run emits
//!
//! # Example
//!
//! ```no_run
//! use qqq::config::LoggingConfig;
//! use qqq::logging::init_logging;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(process = "copyPeople", "Process started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the end of a pipe loop
///
/// # Example
///
/// ```no_run
/// use qqq::log_pipe_loop_complete;
/// use std::time::Duration;
///
/// log_pipe_loop_complete!("copyPeople:execute", 25, Duration::from_millis(40));
/// ```
#[macro_export]
macro_rules! log_pipe_loop_complete {
    ($job_name:expr, $count:expr, $duration:expr) => {
        tracing::info!(
            job = %$job_name,
            count = $count,
            duration_ms = $duration.as_millis() as u64,
            "Pipe loop completed"
        );
    };
}

/// Log how a cache lookup was served
///
/// # Example
///
/// ```no_run
/// use qqq::log_cache_result;
///
/// log_cache_result!("personCache", 3, 1, 1);
/// ```
#[macro_export]
macro_rules! log_cache_result {
    ($table:expr, $fresh:expr, $fetched:expr, $removed:expr) => {
        tracing::debug!(
            table = %$table,
            fresh = $fresh,
            fetched_from_source = $fetched,
            removed = $removed,
            "Cache lookup resolved"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use qqq::log_error_with_context;
/// use qqq::domain::QqqError;
///
/// let error = QqqError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

#[cfg(test)]
mod tests {
    use crate::domain::QqqError;
    use std::time::Duration;

    #[test]
    fn test_macros_expand_without_subscriber() {
        log_pipe_loop_complete!("job", 3usize, Duration::from_millis(5));
        log_cache_result!("cache", 1usize, 0usize, 0usize);
        log_error_with_context!(&QqqError::Other("boom".to_string()), "testing");
    }
}
