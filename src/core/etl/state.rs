//! State of one process run
//!
//! The step list, the step currently running, the named process values and the
//! records shown to the caller. Only the preview and validate phases may rewrite
//! the step list, and only while they are the step being run.

use crate::config::schema::ProcessConfig;
use crate::domain::record::Record;
use crate::domain::{QqqError, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Names of the process values read and written by the engine
pub mod values {
    /// Table records are extracted from
    pub const SOURCE_TABLE: &str = "sourceTable";
    /// Table records are loaded into
    pub const DESTINATION_TABLE: &str = "destinationTable";
    /// Extract step code
    pub const EXTRACT_CODE: &str = "extractCode";
    /// Transform step code
    pub const TRANSFORM_CODE: &str = "transformCode";
    /// Load step code
    pub const LOAD_CODE: &str = "loadCode";
    /// Whether the process offers full validation (default false)
    pub const SUPPORTS_FULL_VALIDATION: &str = "supportsFullValidation";
    /// Whether the caller asked for full validation (default false)
    pub const DO_FULL_VALIDATION: &str = "doFullValidation";
    /// Filter from the process definition, as JSON
    pub const DEFAULT_QUERY_FILTER: &str = "defaultQueryFilter";
    /// Filter supplied by the caller, as a JSON string
    pub const QUERY_FILTER_JSON: &str = "queryFilterJson";
    /// Source record count (estimate from preview, exact after validate/execute)
    pub const RECORD_COUNT: &str = "recordCount";
    /// Summary of execute
    pub const PROCESS_SUMMARY: &str = "processSummary";
    /// Summary of validate
    pub const VALIDATION_SUMMARY: &str = "validationSummary";
}

/// A step of a streamed ETL process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Preview,
    Review,
    Validate,
    Execute,
    Result,
}

impl StepName {
    /// Default step list
    pub const DEFAULT_STEPS: [StepName; 5] = [
        StepName::Preview,
        StepName::Review,
        StepName::Validate,
        StepName::Execute,
        StepName::Result,
    ];

    /// Steps the runner stops at, waiting for the caller
    pub fn is_frontend(self) -> bool {
        matches!(self, StepName::Review | StepName::Result)
    }

    /// Step name as used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::Preview => "preview",
            StepName::Review => "review",
            StepName::Validate => "validate",
            StepName::Execute => "execute",
            StepName::Result => "result",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named values of a process run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessValues(IndexMap<String, serde_json::Value>);

impl ProcessValues {
    /// Create an empty set of values
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed values from a process definition
    pub fn from_definition(definition: &ProcessConfig) -> Self {
        let mut values = Self::new();
        values.set(values::SOURCE_TABLE, definition.source_table.as_str());
        values.set(values::DESTINATION_TABLE, definition.destination_table.as_str());
        values.set(values::EXTRACT_CODE, definition.extract_code.as_str());
        values.set(values::TRANSFORM_CODE, definition.transform_code.as_str());
        values.set(values::LOAD_CODE, definition.load_code.as_str());
        values.set(values::SUPPORTS_FULL_VALIDATION, definition.supports_full_validation);
        if let Some(filter) = &definition.default_query_filter {
            match serde_json::to_value(filter) {
                Ok(json) => values.set(values::DEFAULT_QUERY_FILTER, json),
                Err(e) => tracing::warn!(
                    process = %definition.name,
                    error = %e,
                    "Default query filter could not be stored in process values"
                ),
            }
        }
        values
    }

    /// Set a value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Raw value
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// String value
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(serde_json::Value::as_str)
    }

    /// Boolean value; `"true"`/`"false"` strings are accepted, anything else is `false`
    pub fn get_bool(&self, name: &str) -> bool {
        match self.get(name) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Unsigned integer value
    pub fn get_usize(&self, name: &str) -> Option<usize> {
        self.get(name)
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    }

    /// Value decoded into a type
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the stored value does not decode
    pub fn get_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(QqqError::from)
    }
}

/// State of one process run
#[derive(Debug, Clone)]
pub struct ProcessState {
    run_id: Uuid,
    process_name: String,
    steps: Vec<StepName>,
    current: Option<usize>,
    values: ProcessValues,
    records: Vec<Record>,
}

impl ProcessState {
    /// Fresh state for a process, positioned before its first step
    pub fn new(definition: &ProcessConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            process_name: definition.name.clone(),
            steps: StepName::DEFAULT_STEPS.to_vec(),
            current: None,
            values: ProcessValues::from_definition(definition),
            records: Vec::new(),
        }
    }

    /// Run identifier
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Process name
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Ordered step list
    pub fn steps(&self) -> &[StepName] {
        &self.steps
    }

    /// Step currently running, or waited on
    pub fn current_step(&self) -> Option<StepName> {
        self.current.and_then(|i| self.steps.get(i).copied())
    }

    /// Step after the current one (the first step before the run starts)
    pub fn next_step(&self) -> Option<StepName> {
        let next = self.current.map_or(0, |i| i + 1);
        self.steps.get(next).copied()
    }

    /// Whether every step has been reached
    pub fn is_complete(&self) -> bool {
        self.next_step().is_none()
    }

    /// Process values
    pub fn values(&self) -> &ProcessValues {
        &self.values
    }

    /// Mutable process values
    pub fn values_mut(&mut self) -> &mut ProcessValues {
        &mut self.values
    }

    /// Records for the caller (preview rows, validation samples or loaded samples)
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn set_records(&mut self, records: Vec<Record>) {
        self.records = records;
    }

    /// Move to the next step
    pub(crate) fn advance(&mut self) -> Option<StepName> {
        let next = self.current.map_or(0, |i| i + 1);
        let step = self.steps.get(next).copied()?;
        self.current = Some(next);
        Some(step)
    }

    /// Replace the step list
    ///
    /// # Errors
    ///
    /// Returns a process error unless the current step is preview or validate and
    /// the new list still contains it
    pub fn rewrite_steps(&mut self, steps: Vec<StepName>) -> Result<()> {
        let current = match self.current_step() {
            Some(step @ (StepName::Preview | StepName::Validate)) => step,
            other => {
                return Err(QqqError::Process(format!(
                    "The step list can only be rewritten by the preview or validate step, not {}",
                    other.map_or("a process that has not started", StepName::as_str)
                )))
            }
        };

        let position = steps.iter().position(|s| *s == current).ok_or_else(|| {
            QqqError::Process(format!("Rewritten step list must keep the current step {current}"))
        })?;

        tracing::debug!(
            run_id = %self.run_id,
            from = ?self.steps,
            to = ?steps,
            "Rewriting step list"
        );
        self.steps = steps;
        self.current = Some(position);
        Ok(())
    }

    /// Move the review step to immediately after `step`
    ///
    /// # Errors
    ///
    /// See [`ProcessState::rewrite_steps`]
    pub fn move_review_after(&mut self, step: StepName) -> Result<()> {
        let mut steps: Vec<StepName> = self
            .steps
            .iter()
            .copied()
            .filter(|s| *s != StepName::Review)
            .collect();
        let position = steps
            .iter()
            .position(|s| *s == step)
            .ok_or_else(|| QqqError::Process(format!("Step {step} is not in the step list")))?;
        steps.insert(position + 1, StepName::Review);
        self.rewrite_steps(steps)
    }
}
