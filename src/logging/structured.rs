//! Structured logging setup using tracing
//!
//! Console output for interactive use, plus optional JSON files with rotation.

use crate::config::LoggingConfig;
use crate::domain::{QqqError, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Guard that must be kept alive for the duration of the program
/// to ensure logs are flushed properly
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            _file_guard: file_guard,
        }
    }
}

/// Initialize the logging system based on configuration
///
/// `RUST_LOG` takes precedence over `log_level_str` when set.
///
/// # Arguments
///
/// * `log_level_str` - Log level as a string (trace, debug, info, warn, error)
/// * `config` - Logging configuration
///
/// # Errors
///
/// Returns a configuration error for an unknown level or an unusable log directory
pub fn init_logging(log_level_str: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_level = parse_log_level(log_level_str)?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qqq={log_level}")));

    let mut layers = vec![tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone())
        .boxed()];

    let file_guard = if config.local_enabled {
        let (file_layer, guard) = json_file_layer(config, env_filter)?;
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| QqqError::Configuration(format!("Failed to install subscriber: {e}")))?;

    tracing::info!(
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        "Logging initialized"
    );

    Ok(LoggingGuard::new(file_guard))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Rolling JSON file layer under `config.local_path`
fn json_file_layer(config: &LoggingConfig, filter: EnvFilter) -> Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(&config.local_path).map_err(|e| {
        QqqError::Configuration(format!(
            "Failed to create log directory {}: {e}",
            config.local_path
        ))
    })?;

    let appender = RollingFileAppender::new(
        rotation(&config.local_rotation),
        &config.local_path,
        "qqq.log",
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(writer)
        .with_filter(filter)
        .boxed();
    Ok((layer, guard))
}

/// Unknown rotation names fall back to daily
fn rotation(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(QqqError::Configuration(format!(
            "Invalid log level: {level_str}. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("trace", Level::TRACE)]
    #[test_case("Debug", Level::DEBUG)]
    #[test_case("INFO", Level::INFO)]
    #[test_case("warn", Level::WARN)]
    #[test_case("error", Level::ERROR)]
    fn test_parse_log_level(input: &str, expected: Level) {
        assert_eq!(parse_log_level(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_log_level_invalid() {
        assert!(parse_log_level("verbose").is_err());
        assert!(parse_log_level("").is_err());
    }

    #[test_case("hourly", Rotation::HOURLY)]
    #[test_case("never", Rotation::NEVER)]
    #[test_case("daily", Rotation::DAILY)]
    #[test_case("size", Rotation::DAILY ; "unknown falls back to daily")]
    fn test_rotation(name: &str, expected: Rotation) {
        assert_eq!(rotation(name), expected);
    }

    #[test]
    fn test_log_directory_must_be_creatable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = LoggingConfig {
            local_enabled: true,
            local_path: file.path().join("logs").display().to_string(),
            ..LoggingConfig::default()
        };

        let err = json_file_layer(&config, EnvFilter::new("qqq=info")).err().unwrap();
        assert!(err.to_string().contains("Failed to create log directory"));
    }
}
