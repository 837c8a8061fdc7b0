//! In-process backend
//!
//! Stores every table in memory, keyed by primary key. Integer primary keys are
//! assigned on insert when absent, declared field types are enforced, and unique
//! keys are checked on insert and update. Operation counters are kept per table
//! so tests and diagnostics can observe how a table was accessed.

use crate::adapters::backend::traits::{
    BackendModule, DeleteInput, DeleteOutput, LoadTransaction, QueryInput, QueryOutput,
};
use crate::adapters::memory::transaction::{MemoryTransaction, TransactionStatistics};
use crate::domain::errors::QqqError;
use crate::domain::filter::QueryFilter;
use crate::domain::record::{Record, Value};
use crate::domain::table::TableMetaData;
use crate::domain::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

/// Rows of one table
#[derive(Debug, Clone)]
pub(crate) struct MemoryTable {
    rows: IndexMap<Value, Record>,
    next_id: i64,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self {
            rows: IndexMap::new(),
            next_id: 1,
        }
    }
}

pub(crate) type MemoryTables = Arc<RwLock<HashMap<String, MemoryTable>>>;

/// Number of calls per action against one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStatistics {
    /// Query calls
    pub queries: usize,
    /// Count calls
    pub counts: usize,
    /// Insert calls
    pub inserts: usize,
    /// Update calls
    pub updates: usize,
    /// Delete calls
    pub deletes: usize,
}

/// Memory backend
///
/// # Examples
///
/// ```
/// use qqq::adapters::backend::{BackendModule, LoadTransaction, QueryInput, QueryOutput};
/// use qqq::adapters::memory::MemoryBackend;
/// use qqq::domain::{FieldType, QueryFilter, Record, TableMetaData};
///
/// # async fn example() -> qqq::domain::Result<()> {
/// let backend = MemoryBackend::new("memory");
/// let table = TableMetaData::new("person", "memory").with_field("name", FieldType::String);
///
/// let inserted = backend
///     .insert(&table, vec![Record::new().with_value("name", "Darin")], &LoadTransaction::Unsupported)
///     .await?;
/// assert!(inserted[0].value("id").is_some());
///
/// let mut output = QueryOutput::list();
/// backend.query(&table, &QueryInput::new(QueryFilter::new()), &mut output).await?;
/// assert_eq!(output.count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    tables: MemoryTables,
    statistics: Mutex<HashMap<String, TableStatistics>>,
    transaction_statistics: Arc<TransactionStatistics>,
    next_transaction_id: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty memory backend
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Arc::new(RwLock::new(HashMap::new())),
            statistics: Mutex::new(HashMap::new()),
            transaction_statistics: Arc::new(TransactionStatistics::default()),
            next_transaction_id: AtomicUsize::new(1),
        }
    }

    /// Backend name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load seed rows from a JSON file of the form `{"tableName": [{...}, ...]}`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the seed file
    /// * `tables` - Metadata of the tables stored in this backend
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed, names a
    /// table this backend does not store, or contains a row that fails to insert.
    pub async fn load_seed_file(&self, path: &Path, tables: &[TableMetaData]) -> Result<usize> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            QqqError::Configuration(format!(
                "Failed to read seed file {}: {}",
                path.display(),
                e
            ))
        })?;
        let seed: IndexMap<String, Vec<serde_json::Value>> = serde_json::from_str(&content)
            .map_err(|e| {
                QqqError::Configuration(format!("Invalid seed file {}: {}", path.display(), e))
            })?;

        let mut loaded = 0;
        for (table_name, rows) in seed {
            let table = tables
                .iter()
                .find(|t| t.name == table_name && t.backend_name == self.name)
                .ok_or_else(|| {
                    QqqError::Configuration(format!(
                        "Seed file names table '{}', which is not stored in backend '{}'",
                        table_name, self.name
                    ))
                })?;

            let records = rows
                .iter()
                .map(Record::from_json)
                .collect::<Result<Vec<_>>>()?;
            let inserted = self
                .insert(table, records, &LoadTransaction::Unsupported)
                .await?;

            if let Some(failed) = inserted.iter().find(|r| r.has_errors()) {
                return Err(QqqError::Configuration(format!(
                    "Seed row for table '{}' failed to load: {}",
                    table_name,
                    failed.errors()[0]
                )));
            }
            loaded += inserted.len();
        }

        tracing::info!(
            backend = %self.name,
            seed_file = %path.display(),
            records = loaded,
            "Loaded seed records"
        );
        Ok(loaded)
    }

    /// Every row currently stored in a table, read directly from storage
    pub async fn rows(&self, table_name: &str) -> Vec<Record> {
        self.tables
            .read()
            .await
            .get(table_name)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Action counters for a table
    pub fn statistics(&self, table_name: &str) -> TableStatistics {
        self.lock_statistics()
            .get(table_name)
            .copied()
            .unwrap_or_default()
    }

    /// Transaction counters for this backend
    pub fn transaction_statistics(&self) -> &TransactionStatistics {
        &self.transaction_statistics
    }

    /// Reset the per-table action counters
    pub fn reset_statistics(&self) {
        self.lock_statistics().clear();
    }

    fn lock_statistics(&self) -> std::sync::MutexGuard<'_, HashMap<String, TableStatistics>> {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self, table_name: &str, bump: impl FnOnce(&mut TableStatistics)) {
        bump(self.lock_statistics().entry(table_name.to_string()).or_default());
    }
}

/// Display label of the primary key field, as used in record messages (`id` → `Id`)
fn primary_key_label(table: &TableMetaData) -> String {
    let mut chars = table.primary_key_field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Copy defined fields of `input` into `target`, coercing them to their declared
/// types. Undefined fields are dropped with a warning on `input`; bad values add
/// an error to `input`.
fn apply_fields(table: &TableMetaData, input: &mut Record, target: &mut Record) {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for (name, value) in input.values() {
        if name == &table.primary_key_field {
            target.set_value(name.clone(), value.clone());
            continue;
        }

        match table.field(name) {
            Some(field) => match field.field_type.coerce(value.clone()) {
                Ok(coerced) => target.set_value(name.clone(), coerced),
                Err(reason) => errors.push(format!("Invalid value for field {name}: {reason}")),
            },
            None if table.fields.is_empty() => target.set_value(name.clone(), value.clone()),
            None => warnings.push(format!(
                "Field {name} is not defined on table {} and was not stored",
                table.name
            )),
        }
    }

    for warning in warnings {
        input.add_warning(warning);
    }
    for error in errors {
        input.add_error(error);
    }
}

fn carry_messages(from: &Record, to: &mut Record) {
    for warning in from.warnings() {
        to.add_warning(warning.message.clone());
    }
    for error in from.errors() {
        to.add_error(error.message.clone());
    }
}

/// First unique key whose tuple on `candidate` is already held by another row
fn unique_key_clash(
    table: &TableMetaData,
    stored: &MemoryTable,
    candidate: &Record,
    own_primary_key: Option<&Value>,
) -> Option<String> {
    table.unique_keys.iter().find_map(|key| {
        let tuple = key.tuple_of(candidate)?;
        let clash = stored.rows.iter().any(|(pk, row)| {
            Some(pk) != own_primary_key && key.tuple_of(row).as_ref() == Some(&tuple)
        });
        clash.then(|| key.describe())
    })
}

#[async_trait]
impl BackendModule for MemoryBackend {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn backend_type(&self) -> &str {
        "memory"
    }

    async fn query(
        &self,
        table: &TableMetaData,
        input: &QueryInput<'_>,
        output: &mut QueryOutput,
    ) -> Result<()> {
        self.record_call(&table.name, |s| s.queries += 1);

        // Collect under the read lock, emit after releasing it: a streamed output
        // may wait on a consumer that writes to this backend.
        let mut matching: Vec<Record> = {
            let tables = self.tables.read().await;
            tables
                .get(&table.name)
                .map(|t| {
                    t.rows
                        .values()
                        .filter(|row| input.filter.matches(row))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        input.filter.sort(&mut matching);
        let skip = input.filter.skip.unwrap_or(0);
        let limit = input.filter.limit.unwrap_or(usize::MAX);

        tracing::trace!(
            table = %table.name,
            matched = matching.len(),
            skip,
            "Memory backend query"
        );

        for record in matching.into_iter().skip(skip).take(limit) {
            output.add_record(record).await?;
        }
        Ok(())
    }

    async fn count(&self, table: &TableMetaData, filter: &QueryFilter) -> Result<usize> {
        self.record_call(&table.name, |s| s.counts += 1);

        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.name)
            .map(|t| t.rows.values().filter(|row| filter.matches(row)).count())
            .unwrap_or(0))
    }

    async fn insert(
        &self,
        table: &TableMetaData,
        records: Vec<Record>,
        _transaction: &LoadTransaction,
    ) -> Result<Vec<Record>> {
        self.record_call(&table.name, |s| s.inserts += 1);

        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.name.clone()).or_default();
        let pk_label = primary_key_label(table);

        let mut output = Vec::with_capacity(records.len());
        for mut record in records {
            if record.has_errors() {
                output.push(record);
                continue;
            }

            let mut row = Record::new();
            apply_fields(table, &mut record, &mut row);

            let primary_key = match row.value_or_null(&table.primary_key_field).clone() {
                Value::Null => {
                    let id = Value::Integer(stored.next_id);
                    row.set_value(table.primary_key_field.clone(), id.clone());
                    id
                }
                existing => existing,
            };

            if stored.rows.contains_key(&primary_key) {
                record.add_error(format!("Another record already exists with this {pk_label}"));
            } else if let Some(fields) = unique_key_clash(table, stored, &row, None) {
                record.add_error(format!("Another record already exists with this {fields}"));
            }

            if record.has_errors() {
                output.push(record);
                continue;
            }

            if let Value::Integer(id) = primary_key {
                stored.next_id = stored.next_id.max(id + 1);
            }

            carry_messages(&record, &mut row);
            let mut clean = row.clone();
            clean.clear_annotations();
            stored.rows.insert(primary_key, clean);
            output.push(row);
        }

        Ok(output)
    }

    async fn update(
        &self,
        table: &TableMetaData,
        records: Vec<Record>,
        _transaction: &LoadTransaction,
    ) -> Result<Vec<Record>> {
        self.record_call(&table.name, |s| s.updates += 1);

        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.name.clone()).or_default();
        let pk_label = primary_key_label(table);

        let mut output = Vec::with_capacity(records.len());
        for mut record in records {
            if record.has_errors() {
                output.push(record);
                continue;
            }

            let primary_key = record.value_or_null(&table.primary_key_field).clone();
            if primary_key.is_null() {
                record.add_error(format!("Missing value in primary key field {pk_label}"));
                output.push(record);
                continue;
            }

            let Some(existing) = stored.rows.get(&primary_key) else {
                record.add_error(format!(
                    "No record was found to update for {pk_label} = {primary_key}"
                ));
                output.push(record);
                continue;
            };

            let mut row = existing.clone();
            apply_fields(table, &mut record, &mut row);

            if let Some(fields) = unique_key_clash(table, stored, &row, Some(&primary_key)) {
                record.add_error(format!("Another record already exists with this {fields}"));
            }

            if record.has_errors() {
                output.push(record);
                continue;
            }

            carry_messages(&record, &mut row);
            let mut clean = row.clone();
            clean.clear_annotations();
            stored.rows.insert(primary_key, clean);
            output.push(row);
        }

        Ok(output)
    }

    async fn delete(
        &self,
        table: &TableMetaData,
        input: DeleteInput,
        _transaction: &LoadTransaction,
    ) -> Result<DeleteOutput> {
        self.record_call(&table.name, |s| s.deletes += 1);

        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.name.clone()).or_default();
        let pk_label = primary_key_label(table);
        let mut output = DeleteOutput::default();

        let primary_keys = match input {
            DeleteInput::PrimaryKeys(primary_keys) => primary_keys,
            DeleteInput::Filter(filter) => stored
                .rows
                .iter()
                .filter(|(_, row)| filter.matches(row))
                .map(|(pk, _)| pk.clone())
                .collect(),
        };

        for primary_key in primary_keys {
            if stored.rows.shift_remove(&primary_key).is_some() {
                output.deleted_count += 1;
            } else {
                let mut record =
                    Record::new().with_value(table.primary_key_field.clone(), primary_key.clone());
                record.add_error(format!(
                    "No record was found to delete for {pk_label} = {primary_key}"
                ));
                output.records_with_errors.push(record);
            }
        }

        Ok(output)
    }

    async fn open_transaction(&self, table: &TableMetaData) -> Result<LoadTransaction> {
        let id = format!(
            "{}-tx-{}",
            self.name,
            self.next_transaction_id.fetch_add(1, Ordering::Relaxed)
        );
        let snapshot = self.tables.read().await.get(&table.name).cloned();

        let transaction = MemoryTransaction::new(
            id,
            table.name.clone(),
            snapshot,
            self.tables.clone(),
            self.transaction_statistics.clone(),
        );
        Ok(LoadTransaction::Open(Box::new(transaction)))
    }
}
