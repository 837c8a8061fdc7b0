//! Backend factory
//!
//! This module provides factory functions to create backends based on configuration.

use crate::adapters::backend::traits::BackendModule;
use crate::adapters::memory::MemoryBackend;
use crate::config::schema::{BackendConfig, QqqConfig};
use crate::domain::errors::QqqError;
use crate::domain::table::TableMetaData;
use crate::domain::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Create a backend based on its configuration
///
/// # Arguments
///
/// * `config` - The backend configuration
/// * `tables` - All table definitions (used to load seed data)
///
/// # Returns
///
/// Returns an Arc-wrapped trait object that implements BackendModule
///
/// # Errors
///
/// Returns an error if the backend type is unknown or its seed data cannot be loaded
pub async fn create_backend(
    config: &BackendConfig,
    tables: &[TableMetaData],
) -> Result<Arc<dyn BackendModule + Send + Sync>> {
    match config.backend_type.as_str() {
        "memory" => {
            tracing::info!(backend = %config.name, "Creating memory backend");
            let backend = MemoryBackend::new(config.name.clone());

            if let Some(seed_file) = &config.seed_file {
                backend.load_seed_file(Path::new(seed_file), tables).await?;
            }

            Ok(Arc::new(backend) as Arc<dyn BackendModule + Send + Sync>)
        }
        other => Err(QqqError::Configuration(format!(
            "Unsupported backend type '{}' for backend '{}'",
            other, config.name
        ))),
    }
}

/// Create every backend named in the configuration
///
/// # Errors
///
/// Returns the first error raised while creating a backend
pub async fn create_backends(
    config: &QqqConfig,
) -> Result<HashMap<String, Arc<dyn BackendModule + Send + Sync>>> {
    let mut backends = HashMap::new();
    for backend_config in &config.backends {
        let backend = create_backend(backend_config, &config.tables).await?;
        backends.insert(backend_config.name.clone(), backend);
    }
    Ok(backends)
}
