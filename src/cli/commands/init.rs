//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "qqq.toml")]
    pub output: String,

    /// Include a cache table and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing QQQ configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your tables and processes", self.output);
                println!("  2. Set QQQ_SEED_FILE to a JSON file of seed rows if the config references it");
                println!("  3. Validate configuration: qqq validate-config");
                println!("  4. Run a process: qqq run copyPeople");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# QQQ Configuration File

[application]
name = "qqq"
log_level = "info"

[etl]
page_size = 500
preview_limit = 20

[logging]
local_enabled = false

[[backends]]
name = "memory"
type = "memory"

[[tables]]
name = "person"
backend_name = "memory"
fields = [
    { name = "firstName", type = "string" },
    { name = "lastName", type = "string" },
    { name = "email", type = "string" },
]
unique_keys = [{ fields = ["email"] }]

[[tables]]
name = "personCopy"
backend_name = "memory"
fields = [
    { name = "firstName", type = "string" },
    { name = "lastName", type = "string" },
    { name = "email", type = "string" },
]

[[processes]]
name = "copyPeople"
source_table = "person"
destination_table = "personCopy"
load_code = "insert"
default_query_filter = { criteria = [] }
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# QQQ Configuration File
#
# This file contains all configuration options with examples and explanations.
# ${VAR} references are replaced from the environment, and QQQ_* variables
# override individual settings (e.g. QQQ_ETL_PAGE_SIZE=1000).

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Application name (used in logging)
name = "qqq"

# Log level (trace, debug, info, warn, error)
log_level = "info"

# ============================================================================
# Streamed ETL Settings
# ============================================================================
[etl]
# Records per transform/load page during execute
page_size = 500

# Records shown by preview, and sample records kept by validate and execute
preview_limit = 20

# Records the pipe holds before the extract step waits for the consumer
pipe_capacity = 1000

# Longest sleep between polls of an empty pipe, in milliseconds
max_poll_interval_ms = 100

# ============================================================================
# Cache Settings
# ============================================================================
[cache]
# Tuples per existence-check query against a table's unique keys
unique_key_page_size = 1000

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
# Enable local JSON file logging
local_enabled = true

# Local log directory
local_path = "./logs"

# Log rotation (daily, hourly or never)
local_rotation = "daily"

# ============================================================================
# Backends
# ============================================================================
[[backends]]
name = "memory"
type = "memory"
# JSON object of table name -> array of rows, loaded at startup
seed_file = "${QQQ_SEED_FILE}"

# ============================================================================
# Tables
# ============================================================================
[[tables]]
name = "person"
backend_name = "memory"
fields = [
    { name = "firstName", type = "string" },
    { name = "lastName", type = "string" },
    { name = "email", type = "string" },
    { name = "status", type = "integer", possible_values = [
        { id = 1, label = "Active" },
        { id = 2, label = "Inactive" },
    ] },
]
unique_keys = [{ fields = ["email"] }]

# A cache table: lookups by email are served from here while fresh, and
# refreshed from "person" once older than expiration_seconds
[[tables]]
name = "personCache"
backend_name = "memory"
fields = [
    { name = "firstName", type = "string" },
    { name = "email", type = "string" },
    { name = "cachedDate", type = "date_time" },
]
unique_keys = [{ fields = ["email"] }]

[tables.cache_of]
source_table = "person"
expiration_seconds = 3600
cached_date_field = "cachedDate"

[[tables.cache_of.use_cases]]
cache_unique_key = { fields = ["email"] }
source_unique_key = { fields = ["email"] }
# Records matching any of these filters are returned but never cached
exclude_records_matching = [
    { criteria = [{ fieldName = "status", operator = "EQUALS", values = [2] }] },
]

[[tables]]
name = "contact"
backend_name = "memory"
fields = [
    { name = "givenName", type = "string" },
    { name = "emailAddress", type = "string" },
]

# ============================================================================
# Processes
# ============================================================================
[[processes]]
name = "copyPeople"
source_table = "person"
destination_table = "contact"

# Step codes
extract_code = "backend_query"     # backend_query
transform_code = "field_mapping"   # noop | field_mapping
load_code = "insert_or_update"     # insert | update | insert_or_update | delete

# Allow `qqq run --full-validation` to transform everything before execute
supports_full_validation = true

# Used when the caller gives no filter
default_query_filter = { criteria = [], orderBys = [{ fieldName = "id" }] }

[processes.field_mappings]
firstName = "givenName"
email = "emailAddress"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_init_args_defaults() {
        let args = InitArgs {
            output: "qqq.toml".to_string(),
            with_examples: false,
            force: false,
        };

        assert_eq!(args.output, "qqq.toml");
        assert!(!args.with_examples);
        assert!(!args.force);
    }

    #[test]
    fn test_generated_minimal_config_parses() {
        let config = parse_config(&InitArgs::generate_minimal_config()).unwrap();
        assert_eq!(config.tables.len(), 2);
        assert!(config.process("copyPeople").is_some());
    }

    #[test]
    fn test_generate_config_with_examples() {
        let config = InitArgs::generate_config_with_examples();
        assert!(config.contains("# QQQ Configuration File"));
        assert!(config.contains("cache_of"));
        assert!(config.contains("field_mappings"));
    }
}
