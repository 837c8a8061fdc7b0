//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the QQQ configuration file.

use crate::config::load_config;
use crate::core::QqqInstance;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        // Builds the backends too, so seed files are checked
        match QqqInstance::from_config(&config).await {
            Ok(instance) => {
                println!("✅ Configuration is valid");
                println!();
                println!("Configuration Summary:");
                println!("  Application: {}", config.application.name);
                println!("  Log Level: {}", config.application.log_level);
                println!("  Page Size: {}", config.etl.page_size);
                println!("  Preview Limit: {}", config.etl.preview_limit);
                println!("  Pipe Capacity: {}", config.etl.pipe_capacity);
                println!(
                    "  Backends: {:?}",
                    config.backends.iter().map(|b| b.name.as_str()).collect::<Vec<_>>()
                );
                for table in &config.tables {
                    match &table.cache_of {
                        Some(cache_of) => println!(
                            "  Table: {} (cache of {}, expires after {}s)",
                            table.name, cache_of.source_table, cache_of.expiration_seconds
                        ),
                        None => println!("  Table: {}", table.name),
                    }
                }
                println!("  Processes: {:?}", instance.process_names());
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                Ok(2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_is_a_configuration_error() {
        let code = ValidateArgs {}.execute("/nonexistent/qqq.toml").await.unwrap();
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn test_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
local_enabled = false

[[backends]]
name = "memory"
type = "memory"

[[tables]]
name = "person"
backend_name = "memory"
fields = [{{ name = "email", type = "string" }}]
"#
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 0);
    }
}
