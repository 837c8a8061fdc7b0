//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::QqqConfig;
use crate::domain::errors::QqqError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into QqqConfig
/// 4. Applies environment variable overrides (QQQ_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use qqq::config::loader::load_config;
///
/// let config = load_config("qqq.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<QqqConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(QqqError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        QqqError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration from TOML text
///
/// Applies the same substitution, overrides and validation as [`load_config`].
///
/// # Errors
///
/// Returns a configuration error if substitution, parsing or validation fails.
pub fn parse_config(contents: &str) -> Result<QqqConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: QqqConfig = toml::from_str(&contents)?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        QqqError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    tracing::debug!(
        backends = config.backends.len(),
        tables = config.tables.len(),
        processes = config.processes.len(),
        "Configuration loaded"
    );

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Arguments
///
/// * `input` - String containing ${VAR} placeholders
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| QqqError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        // Skip comment lines - don't process env vars in comments
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(QqqError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parsed<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse().map(Some).map_err(|_| {
            QqqError::Configuration(format!("Invalid value '{}' for {}", val, name))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using QQQ_* prefix
///
/// Environment variables follow the pattern: QQQ_<SECTION>_<KEY>
/// For example: QQQ_ETL_PAGE_SIZE, QQQ_CACHE_UNIQUE_KEY_PAGE_SIZE
///
/// # Arguments
///
/// * `config` - Mutable reference to the configuration to update
fn apply_env_overrides(config: &mut QqqConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("QQQ_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // ETL overrides
    if let Some(size) = env_parsed("QQQ_ETL_PAGE_SIZE")? {
        config.etl.page_size = size;
    }
    if let Some(limit) = env_parsed("QQQ_ETL_PREVIEW_LIMIT")? {
        config.etl.preview_limit = limit;
    }
    if let Some(capacity) = env_parsed("QQQ_ETL_PIPE_CAPACITY")? {
        config.etl.pipe_capacity = capacity;
    }
    if let Some(interval) = env_parsed("QQQ_ETL_MAX_POLL_INTERVAL_MS")? {
        config.etl.max_poll_interval_ms = interval;
    }

    // Cache overrides
    if let Some(size) = env_parsed("QQQ_CACHE_UNIQUE_KEY_PAGE_SIZE")? {
        config.cache.unique_key_page_size = size;
    }

    // Logging overrides
    if let Some(enabled) = env_parsed("QQQ_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = enabled;
    }
    if let Ok(val) = std::env::var("QQQ_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
