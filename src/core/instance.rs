//! Runtime registry of backends, tables and processes

use crate::adapters::backend::{create_backends, BackendModule};
use crate::config::schema::{CacheConfig, EtlConfig, ProcessConfig, QqqConfig};
use crate::domain::errors::{BackendError, QqqError};
use crate::domain::table::TableMetaData;
use crate::domain::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything actions and processes need to resolve names at runtime
///
/// Built once (from configuration or with the builder methods) and shared behind
/// an [`Arc`].
///
/// # Examples
///
/// ```
/// use qqq::adapters::memory::MemoryBackend;
/// use qqq::core::QqqInstance;
/// use qqq::domain::{FieldType, TableMetaData};
/// use std::sync::Arc;
///
/// let instance = QqqInstance::new()
///     .with_backend("memory", Arc::new(MemoryBackend::new("memory")))
///     .with_table(TableMetaData::new("person", "memory").with_field("name", FieldType::String));
///
/// assert!(instance.validate().is_ok());
/// assert!(instance.table("person").is_ok());
/// ```
#[derive(Clone, Default)]
pub struct QqqInstance {
    backends: HashMap<String, Arc<dyn BackendModule + Send + Sync>>,
    tables: HashMap<String, TableMetaData>,
    processes: HashMap<String, ProcessConfig>,
    etl: EtlConfig,
    cache: CacheConfig,
}

impl QqqInstance {
    /// Create an empty instance with default engine settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an instance from validated configuration, creating its backends
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be created or the resulting instance
    /// fails validation
    pub async fn from_config(config: &QqqConfig) -> Result<Self> {
        let backends = create_backends(config).await?;

        let instance = Self {
            backends,
            tables: config
                .tables
                .iter()
                .map(|t| (t.name.clone(), t.clone()))
                .collect(),
            processes: config
                .processes
                .iter()
                .map(|p| (p.name.clone(), p.clone()))
                .collect(),
            etl: config.etl.clone(),
            cache: config.cache.clone(),
        };
        instance.validate()?;

        tracing::info!(
            backends = instance.backends.len(),
            tables = instance.tables.len(),
            processes = instance.processes.len(),
            "QQQ instance ready"
        );
        Ok(instance)
    }

    /// Builder: register a backend
    pub fn with_backend(
        mut self,
        name: impl Into<String>,
        backend: Arc<dyn BackendModule + Send + Sync>,
    ) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    /// Builder: register a table
    pub fn with_table(mut self, table: TableMetaData) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Builder: register a process
    pub fn with_process(mut self, process: ProcessConfig) -> Self {
        self.processes.insert(process.name.clone(), process);
        self
    }

    /// Builder: replace the ETL settings
    pub fn with_etl_config(mut self, etl: EtlConfig) -> Self {
        self.etl = etl;
        self
    }

    /// Builder: replace the cache settings
    pub fn with_cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Check that every table's backend, and every cache table's source, is registered
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first broken reference
    pub fn validate(&self) -> Result<()> {
        for table in self.tables.values() {
            table.validate().map_err(QqqError::Configuration)?;

            if !self.backends.contains_key(&table.backend_name) {
                return Err(QqqError::Configuration(format!(
                    "Table '{}' references unknown backend '{}'",
                    table.name, table.backend_name
                )));
            }
            if let Some(cache_of) = &table.cache_of {
                if !self.tables.contains_key(&cache_of.source_table) {
                    return Err(QqqError::Configuration(format!(
                        "Cache table '{}' references unknown source table '{}'",
                        table.name, cache_of.source_table
                    )));
                }
            }
        }

        for process in self.processes.values() {
            for table_name in [&process.source_table, &process.destination_table] {
                if !self.tables.contains_key(table_name) {
                    return Err(QqqError::Configuration(format!(
                        "Process '{}' references unknown table '{}'",
                        process.name, table_name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a table
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::TableNotFound`] for an unknown name
    pub fn table(&self, name: &str) -> Result<&TableMetaData> {
        self.tables
            .get(name)
            .ok_or_else(|| BackendError::TableNotFound(name.to_string()).into())
    }

    /// Backend that stores a table
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::BackendNotFound`] if the table's backend is not registered
    pub fn backend_for(&self, table: &TableMetaData) -> Result<&Arc<dyn BackendModule + Send + Sync>> {
        self.backend(&table.backend_name)
    }

    /// Look up a backend by name
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::BackendNotFound`] for an unknown name
    pub fn backend(&self, name: &str) -> Result<&Arc<dyn BackendModule + Send + Sync>> {
        self.backends
            .get(name)
            .ok_or_else(|| BackendError::BackendNotFound(name.to_string()).into())
    }

    /// Look up a process definition
    ///
    /// # Errors
    ///
    /// Returns a process error for an unknown name
    pub fn process(&self, name: &str) -> Result<&ProcessConfig> {
        self.processes
            .get(name)
            .ok_or_else(|| QqqError::Process(format!("Process not found: {name}")))
    }

    /// Names of all registered processes, sorted
    pub fn process_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// ETL engine settings
    pub fn etl_config(&self) -> &EtlConfig {
        &self.etl
    }

    /// Cache settings
    pub fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }
}

impl std::fmt::Debug for QqqInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut backends: Vec<&String> = self.backends.keys().collect();
        backends.sort();
        let mut tables: Vec<&String> = self.tables.keys().collect();
        tables.sort();

        f.debug_struct("QqqInstance")
            .field("backends", &backends)
            .field("tables", &tables)
            .field("processes", &self.process_names())
            .finish()
    }
}
