//! Run command implementation
//!
//! This module implements the `run` command: preview (and optionally validate) a
//! streamed ETL process, ask for confirmation, then execute it.

use crate::config::load_config;
use crate::core::etl::{values, ProcessState, ProcessSummary, StepRegistry, StreamedEtlProcess};
use crate::core::QqqInstance;
use crate::domain::{QqqError, Record};
use clap::Args;
use std::sync::Arc;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name of the process to run
    pub process: String,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Transform every source record before asking for confirmation
    #[arg(long)]
    pub full_validation: bool,

    /// Query filter as JSON, replacing the process's default filter
    #[arg(long, value_name = "JSON")]
    pub filter: Option<String>,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(process = %self.process, "Starting run command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Configuration validation failed: {e}");
                return Ok(2);
            }
        };

        let instance = match QqqInstance::from_config(&config).await {
            Ok(i) => Arc::new(i),
            Err(e) => {
                eprintln!("Failed to initialize instance: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let process = match StreamedEtlProcess::new(instance, &self.process, &StepRegistry::default()) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to prepare process {}: {e}", self.process);
                return Ok(exit_code_for(&e));
            }
        };

        let mut state = process.new_state();
        if self.full_validation {
            state.values_mut().set(values::DO_FULL_VALIDATION, true);
        }
        if let Some(filter) = &self.filter {
            state.values_mut().set(values::QUERY_FILTER_JSON, filter.clone());
        }

        if let Err(e) = process.run(&mut state).await {
            eprintln!("Process failed before review: {e}");
            return Ok(exit_code_for(&e));
        }

        Self::print_review(&state);

        if !self.yes {
            print!("Proceed with execute? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Run cancelled.");
                return Ok(0);
            }
        }

        println!("🚀 Executing {}...", self.process);
        println!();

        if let Err(e) = process.resume(&mut state).await {
            eprintln!("Process failed: {e}");
            return Ok(exit_code_for(&e));
        }

        let summary: ProcessSummary = state
            .values()
            .get_json(values::PROCESS_SUMMARY)?
            .unwrap_or_default();
        println!("📊 Process Summary:");
        Self::print_summary(&summary);
        println!();

        if summary.is_successful() {
            println!("✅ Process completed successfully!");
            Ok(0)
        } else {
            println!("⚠️  Process completed with record errors");
            Ok(1)
        }
    }

    fn print_review(state: &ProcessState) {
        println!("🔍 Review of {} (run {})", state.process_name(), state.run_id());
        if let Some(count) = state.values().get_usize(values::RECORD_COUNT) {
            println!("  Source records: {count}");
        }
        println!();

        println!("Sample records:");
        if state.records().is_empty() {
            println!("  (none)");
        }
        for record in state.records() {
            println!("  {}", display_json(record));
        }
        println!();

        if let Ok(Some(summary)) = state
            .values()
            .get_json::<ProcessSummary>(values::VALIDATION_SUMMARY)
        {
            println!("Validation Summary:");
            Self::print_summary(&summary);
            println!();
        }
    }

    fn print_summary(summary: &ProcessSummary) {
        println!("  Records processed: {}", summary.records_processed);
        for line in &summary.lines {
            println!("  {:?}: {} {}", line.status, line.count, line.message);
        }
        println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    }
}

/// Records print with their display values in place of raw values
fn display_json(record: &Record) -> serde_json::Value {
    let mut json = record.to_json();
    if let Some(object) = json.as_object_mut() {
        for (field, value) in object.iter_mut() {
            if let Some(display) = record.display_value(field) {
                *value = serde_json::Value::String(display.to_string());
            }
        }
    }
    json
}

fn exit_code_for(error: &QqqError) -> i32 {
    match error {
        QqqError::Configuration(_) => 2,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&QqqError::Configuration("x".to_string())), 2);
        assert_eq!(exit_code_for(&QqqError::Process("x".to_string())), 5);
    }

    #[test]
    fn test_display_json_prefers_labels() {
        let mut record = Record::new().with_value("id", 1).with_value("status", 2);
        record.set_display_value("status", "Active");

        let json = display_json(&record);
        assert_eq!(json["status"], "Active");
        assert_eq!(json["id"], 1);
    }
}
