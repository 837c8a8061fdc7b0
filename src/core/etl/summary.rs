//! Process summary and reporting
//!
//! This module defines the running summary threaded through every transform and
//! load page: one line per outcome, with a count and a sample of primary keys.

use crate::domain::record::{Record, Value};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Primary keys kept per summary line
pub const MAX_SAMPLE_PRIMARY_KEYS: usize = 50;

/// Outcome category of a summary line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Processed successfully
    Ok,
    /// Informational
    Info,
    /// Processed, with a warning
    Warning,
    /// Not processed
    Error,
}

/// One outcome and how many records had it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummaryLine {
    /// Outcome category
    pub status: Status,

    /// Number of records
    pub count: usize,

    /// Description, e.g. `records were inserted`
    pub message: String,

    /// Primary keys of the first records counted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_keys: Vec<Value>,
}

/// Summary of a process phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    /// Outcome lines, in first-seen order
    pub lines: Vec<ProcessSummaryLine>,

    /// Records seen by the phase
    pub records_processed: usize,

    /// Wall time of the phase
    #[serde(default)]
    pub duration: Duration,
}

impl ProcessSummary {
    /// Create an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Count `count` records against the line for `status` and `message`
    pub fn add(&mut self, status: Status, message: &str, count: usize) {
        self.line_mut(status, message).count += count;
    }

    /// Count one record, keeping its primary key as a sample
    pub fn add_record(&mut self, status: Status, message: &str, primary_key: Option<&Value>) {
        let line = self.line_mut(status, message);
        line.count += 1;
        if let Some(pk) = primary_key.filter(|pk| !pk.is_null()) {
            if line.primary_keys.len() < MAX_SAMPLE_PRIMARY_KEYS {
                line.primary_keys.push(pk.clone());
            }
        }
    }

    /// Count a processed record by its outcome
    ///
    /// Every error and warning on the record gets its own line; a record without
    /// errors is also counted under `ok_message`.
    pub fn add_record_outcome(&mut self, record: &Record, primary_key_field: &str, ok_message: &str) {
        self.records_processed += 1;
        let pk = record.value(primary_key_field);

        for error in record.errors() {
            self.add_record(Status::Error, &error.message, pk);
        }
        for warning in record.warnings() {
            self.add_record(Status::Warning, &warning.message, pk);
        }
        if !record.has_errors() {
            self.add_record(Status::Ok, ok_message, pk);
        }
    }

    /// Fold another summary into this one
    pub fn merge(&mut self, other: ProcessSummary) {
        self.records_processed += other.records_processed;
        self.duration += other.duration;
        for other_line in other.lines {
            let line = self.line_mut(other_line.status, &other_line.message);
            line.count += other_line.count;
            let room = MAX_SAMPLE_PRIMARY_KEYS.saturating_sub(line.primary_keys.len());
            line.primary_keys
                .extend(other_line.primary_keys.into_iter().take(room));
        }
    }

    /// Total records counted under a status
    pub fn count(&self, status: Status) -> usize {
        self.lines
            .iter()
            .filter(|l| l.status == status)
            .map(|l| l.count)
            .sum()
    }

    /// Line for a status and message, if any record was counted under it
    pub fn line(&self, status: Status, message: &str) -> Option<&ProcessSummaryLine> {
        self.lines
            .iter()
            .find(|l| l.status == status && l.message == message)
    }

    /// Whether no record failed
    pub fn is_successful(&self) -> bool {
        self.count(Status::Error) == 0
    }

    /// Log the summary
    pub fn log_summary(&self, phase: &str) {
        tracing::info!(
            phase,
            records_processed = self.records_processed,
            ok = self.count(Status::Ok),
            warnings = self.count(Status::Warning),
            errors = self.count(Status::Error),
            duration_ms = self.duration.as_millis() as u64,
            "Process phase completed"
        );

        for line in self.lines.iter().filter(|l| l.status == Status::Error) {
            tracing::warn!(
                phase,
                count = line.count,
                message = %line.message,
                "Records failed"
            );
        }
    }

    fn line_mut(&mut self, status: Status, message: &str) -> &mut ProcessSummaryLine {
        let index = match self
            .lines
            .iter()
            .position(|l| l.status == status && l.message == message)
        {
            Some(index) => index,
            None => {
                self.lines.push(ProcessSummaryLine {
                    status,
                    count: 0,
                    message: message.to_string(),
                    primary_keys: Vec::new(),
                });
                self.lines.len() - 1
            }
        };
        &mut self.lines[index]
    }
}
