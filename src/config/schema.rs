//! Configuration schema types
//!
//! This module defines the configuration structure for QQQ: engine settings,
//! backends, table metadata and process definitions.

use crate::domain::filter::QueryFilter;
use crate::domain::table::TableMetaData;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Backend types this build can create
pub const SUPPORTED_BACKEND_TYPES: &[&str] = &["memory"];

/// Main QQQ configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QqqConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Streamed ETL engine settings
    #[serde(default)]
    pub etl: EtlConfig,

    /// Cache table settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Storage backends
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// Table definitions
    #[serde(default)]
    pub tables: Vec<TableMetaData>,

    /// Process definitions
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
}

impl QqqConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid or any table or
    /// process references something that is not defined
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.etl.validate()?;
        self.cache.validate()?;
        self.logging.validate()?;

        let mut backend_names = HashSet::new();
        for backend in &self.backends {
            backend.validate()?;
            if !backend_names.insert(backend.name.as_str()) {
                return Err(format!("Duplicate backend name '{}'", backend.name));
            }
        }

        let mut table_names = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !table_names.insert(table.name.as_str()) {
                return Err(format!("Duplicate table name '{}'", table.name));
            }
            if !backend_names.contains(table.backend_name.as_str()) {
                return Err(format!(
                    "Table '{}' references unknown backend '{}'",
                    table.name, table.backend_name
                ));
            }
        }

        for table in &self.tables {
            if let Some(cache_of) = &table.cache_of {
                let source = self
                    .table(&cache_of.source_table)
                    .ok_or_else(|| {
                        format!(
                            "Cache table '{}' references unknown source table '{}'",
                            table.name, cache_of.source_table
                        )
                    })?;
                for use_case in &cache_of.use_cases {
                    for field in &use_case.source_unique_key.fields {
                        if !source.has_field(field) {
                            return Err(format!(
                                "Cache table '{}' maps to field '{}', which is not defined on '{}'",
                                table.name, field, source.name
                            ));
                        }
                    }
                }
            }
        }

        let mut process_names = HashSet::new();
        for process in &self.processes {
            process.validate()?;
            if !process_names.insert(process.name.as_str()) {
                return Err(format!("Duplicate process name '{}'", process.name));
            }
            for table_name in [&process.source_table, &process.destination_table] {
                if !table_names.contains(table_name.as_str()) {
                    return Err(format!(
                        "Process '{}' references unknown table '{}'",
                        process.name, table_name
                    ));
                }
            }
        }

        Ok(())
    }

    /// Look up a table definition by name
    pub fn table(&self, name: &str) -> Option<&TableMetaData> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Look up a process definition by name
    pub fn process(&self, name: &str) -> Option<&ProcessConfig> {
        self.processes.iter().find(|p| p.name == name)
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_application_name")]
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_application_name(),
            log_level: default_log_level(),
        }
    }
}

/// Streamed ETL engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Records per transform/load page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Records processed by preview, and sample records kept by validate/execute
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,

    /// Records a pipe buffers before the producer waits
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,

    /// Longest sleep between pipe polls (milliseconds)
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
}

impl EtlConfig {
    fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("etl.page_size must be > 0".to_string());
        }
        if self.preview_limit == 0 {
            return Err("etl.preview_limit must be > 0".to_string());
        }
        if self.pipe_capacity == 0 {
            return Err("etl.pipe_capacity must be > 0".to_string());
        }
        if self.max_poll_interval_ms == 0 {
            return Err("etl.max_poll_interval_ms must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            preview_limit: default_preview_limit(),
            pipe_capacity: default_pipe_capacity(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
        }
    }
}

/// Cache table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Key tuples per existence query
    #[serde(default = "default_unique_key_page_size")]
    pub unique_key_page_size: usize,
}

impl CacheConfig {
    fn validate(&self) -> Result<(), String> {
        if self.unique_key_page_size == 0 {
            return Err("cache.unique_key_page_size must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            unique_key_page_size: default_unique_key_page_size(),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name tables refer to
    pub name: String,

    /// Backend type (currently `memory`)
    #[serde(rename = "type")]
    pub backend_type: String,

    /// JSON seed file loaded when the backend is created (memory backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<String>,
}

impl BackendConfig {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("backends.name cannot be empty".to_string());
        }
        if !SUPPORTED_BACKEND_TYPES.contains(&self.backend_type.as_str()) {
            return Err(format!(
                "Invalid type '{}' for backend '{}'. Must be one of: {}",
                self.backend_type,
                self.name,
                SUPPORTED_BACKEND_TYPES.join(", ")
            ));
        }
        Ok(())
    }
}

/// Streamed ETL process definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Process name
    pub name: String,

    /// Table records are extracted from
    pub source_table: String,

    /// Table records are loaded into
    pub destination_table: String,

    /// Extract step code
    #[serde(default = "default_extract_code")]
    pub extract_code: String,

    /// Transform step code
    #[serde(default = "default_transform_code")]
    pub transform_code: String,

    /// Load step code
    #[serde(default = "default_load_code")]
    pub load_code: String,

    /// Whether the process offers a full validation pass before execute
    #[serde(default)]
    pub supports_full_validation: bool,

    /// Filter used when the caller supplies none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_query_filter: Option<QueryFilter>,

    /// Source field → destination field renames (used by the `field_mapping` transform)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub field_mappings: IndexMap<String, String>,
}

impl ProcessConfig {
    /// Create a process with the default step codes
    pub fn new(
        name: impl Into<String>,
        source_table: impl Into<String>,
        destination_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_table: source_table.into(),
            destination_table: destination_table.into(),
            extract_code: default_extract_code(),
            transform_code: default_transform_code(),
            load_code: default_load_code(),
            supports_full_validation: false,
            default_query_filter: None,
            field_mappings: IndexMap::new(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("processes.name cannot be empty".to_string());
        }
        for (label, code) in [
            ("extract_code", &self.extract_code),
            ("transform_code", &self.transform_code),
            ("load_code", &self.load_code),
        ] {
            if code.trim().is_empty() {
                return Err(format!("Process '{}' has an empty {}", self.name, label));
            }
        }
        if let Some(filter) = &self.default_query_filter {
            filter
                .validate()
                .map_err(|e| format!("Process '{}' default_query_filter: {}", self.name, e))?;
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log file path
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }

        Ok(())
    }

    /// Console-only logging
    pub fn console_only() -> Self {
        Self {
            local_enabled: false,
            ..Self::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_application_name() -> String {
    "qqq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    500
}

fn default_preview_limit() -> usize {
    20
}

fn default_pipe_capacity() -> usize {
    crate::core::pipe::DEFAULT_PIPE_CAPACITY
}

fn default_max_poll_interval_ms() -> u64 {
    100
}

fn default_unique_key_page_size() -> usize {
    1000
}

fn default_extract_code() -> String {
    "backend_query".to_string()
}

fn default_transform_code() -> String {
    "noop".to_string()
}

fn default_load_code() -> String {
    "insert".to_string()
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table::{CacheOf, CacheUseCase, FieldType, UniqueKey};

    fn base_config() -> QqqConfig {
        QqqConfig {
            application: ApplicationConfig::default(),
            etl: EtlConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::console_only(),
            backends: vec![BackendConfig {
                name: "memory".to_string(),
                backend_type: "memory".to_string(),
                seed_file: None,
            }],
            tables: vec![
                TableMetaData::new("person", "memory").with_field("email", FieldType::String),
                TableMetaData::new("archive", "memory").with_field("email", FieldType::String),
            ],
            processes: vec![ProcessConfig::new("archivePeople", "person", "archive")],
        }
    }

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_etl_config_validation() {
        let mut config = EtlConfig::default();
        assert!(config.validate().is_ok());

        config.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_values() {
        let etl = EtlConfig::default();
        assert_eq!(etl.page_size, 500);
        assert_eq!(etl.preview_limit, 20);
        assert_eq!(etl.pipe_capacity, 1000);
        assert_eq!(CacheConfig::default().unique_key_page_size, 1000);

        let process = ProcessConfig::new("p", "a", "b");
        assert_eq!(process.extract_code, "backend_query");
        assert_eq!(process.transform_code, "noop");
        assert_eq!(process.load_code, "insert");
    }

    #[test]
    fn test_full_config_validates() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_type_rejected() {
        let mut config = base_config();
        config.backends[0].backend_type = "mongodb".to_string();
        assert!(config.validate().unwrap_err().contains("mongodb"));
    }

    #[test]
    fn test_table_with_unknown_backend_rejected() {
        let mut config = base_config();
        config.tables[0].backend_name = "rdbms".to_string();
        assert!(config.validate().unwrap_err().contains("unknown backend"));
    }

    #[test]
    fn test_process_with_unknown_table_rejected() {
        let mut config = base_config();
        config.processes[0].destination_table = "nowhere".to_string();
        assert!(config.validate().unwrap_err().contains("unknown table"));
    }

    #[test]
    fn test_cache_source_key_must_exist_on_source() {
        let mut config = base_config();
        config.tables.push(
            TableMetaData::new("personCache", "memory")
                .with_field("email", FieldType::String)
                .with_field("cachedDate", FieldType::DateTime)
                .with_unique_key(UniqueKey::new(["email"]))
                .with_cache_of(CacheOf {
                    source_table: "person".to_string(),
                    expiration_seconds: 60,
                    cached_date_field: "cachedDate".to_string(),
                    use_cases: vec![CacheUseCase {
                        cache_unique_key: UniqueKey::new(["email"]),
                        source_unique_key: UniqueKey::new(["emailAddress"]),
                        cache_source_misses: false,
                        copy_source_primary_key: false,
                        exclude_records_matching: Vec::new(),
                    }],
                }),
        );

        assert!(config.validate().unwrap_err().contains("emailAddress"));

        config.tables[2].cache_of.as_mut().unwrap().use_cases[0].source_unique_key =
            UniqueKey::new(["email"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_process_names_rejected() {
        let mut config = base_config();
        config
            .processes
            .push(ProcessConfig::new("archivePeople", "person", "archive"));
        assert!(config.validate().unwrap_err().contains("Duplicate process"));
    }
}
