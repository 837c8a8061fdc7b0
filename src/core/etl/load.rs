//! Built-in load steps: write to the destination table

use crate::adapters::backend::{DeleteInput, LoadTransaction};
use crate::core::actions;
use crate::core::etl::steps::{LoadStep, StepContext};
use crate::core::etl::summary::{ProcessSummary, Status};
use crate::domain::record::{Record, Value};
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// What a [`TableLoad`] does with each record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Insert every record
    Insert,
    /// Update every record by primary key
    Update,
    /// Update records that carry a primary key, insert the rest
    InsertOrUpdate,
    /// Delete records by primary key
    Delete,
}

/// Loads pages into the process's destination table
#[derive(Debug, Clone, Copy)]
pub struct TableLoad {
    mode: LoadMode,
}

impl TableLoad {
    /// Create a load step
    pub fn new(mode: LoadMode) -> Self {
        Self { mode }
    }

    async fn insert_or_update(
        ctx: &StepContext,
        table_name: &str,
        pk_field: &str,
        records: Vec<Record>,
        transaction: &LoadTransaction,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>> {
        let (updates, inserts): (Vec<Record>, Vec<Record>) = records
            .into_iter()
            .partition(|r| !r.value_or_null(pk_field).is_null());

        let mut output = Vec::with_capacity(updates.len() + inserts.len());
        if !inserts.is_empty() {
            let inserted = actions::insert(ctx.instance(), table_name, inserts, transaction).await?;
            count_outcomes(summary, &inserted, pk_field, "records were inserted");
            output.extend(inserted);
        }
        if !updates.is_empty() {
            let updated = actions::update(ctx.instance(), table_name, updates, transaction).await?;
            count_outcomes(summary, &updated, pk_field, "records were updated");
            output.extend(updated);
        }
        Ok(output)
    }

    async fn delete(
        ctx: &StepContext,
        table_name: &str,
        pk_field: &str,
        mut records: Vec<Record>,
        transaction: &LoadTransaction,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>> {
        let mut primary_keys = Vec::new();
        for record in &mut records {
            match record.value(pk_field).filter(|v| !v.is_null()) {
                Some(pk) => primary_keys.push(pk.clone()),
                None => record.add_error(format!("Missing value in primary key field {pk_field}")),
            }
        }

        if !primary_keys.is_empty() {
            let deleted = actions::delete(
                ctx.instance(),
                table_name,
                DeleteInput::PrimaryKeys(primary_keys),
                transaction,
            )
            .await?;

            let mut messages: HashMap<Value, Record> = HashMap::new();
            for annotated in deleted
                .records_with_errors
                .into_iter()
                .chain(deleted.records_with_warnings)
            {
                let pk = annotated.value_or_null(pk_field).clone();
                messages.insert(pk, annotated);
            }

            for record in &mut records {
                let pk = record.value_or_null(pk_field).clone();
                if let Some(annotated) = messages.get(&pk) {
                    for error in annotated.errors() {
                        record.add_error(error.message.clone());
                    }
                    for warning in annotated.warnings() {
                        record.add_warning(warning.message.clone());
                    }
                }
            }
        }

        count_outcomes(summary, &records, pk_field, "records were deleted");
        Ok(records)
    }
}

#[async_trait]
impl LoadStep for TableLoad {
    async fn open_transaction(&self, ctx: &StepContext) -> Result<LoadTransaction> {
        actions::open_transaction(ctx.instance(), ctx.destination_table()?).await
    }

    async fn load(
        &self,
        ctx: &StepContext,
        records: Vec<Record>,
        transaction: &LoadTransaction,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>> {
        let table_name = ctx.destination_table()?;
        let pk_field = ctx.instance().table(table_name)?.primary_key_field.clone();

        match self.mode {
            LoadMode::Insert => {
                let inserted = actions::insert(ctx.instance(), table_name, records, transaction).await?;
                count_outcomes(summary, &inserted, &pk_field, "records were inserted");
                Ok(inserted)
            }
            LoadMode::Update => {
                let updated = actions::update(ctx.instance(), table_name, records, transaction).await?;
                count_outcomes(summary, &updated, &pk_field, "records were updated");
                Ok(updated)
            }
            LoadMode::InsertOrUpdate => {
                Self::insert_or_update(ctx, table_name, &pk_field, records, transaction, summary).await
            }
            LoadMode::Delete => {
                Self::delete(ctx, table_name, &pk_field, records, transaction, summary).await
            }
        }
    }
}

fn count_outcomes(summary: &mut ProcessSummary, records: &[Record], pk_field: &str, ok_message: &str) {
    for record in records {
        summary.add_record_outcome(record, pk_field, ok_message);
    }
    tracing::trace!(
        page = records.len(),
        errors = records.iter().filter(|r| r.has_errors()).count(),
        "Loaded page"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryBackend;
    use crate::config::schema::ProcessConfig;
    use crate::core::etl::state::ProcessValues;
    use crate::core::instance::QqqInstance;
    use crate::domain::filter::QueryFilter;
    use crate::domain::table::{FieldType, TableMetaData};
    use std::sync::Arc;

    fn context(load_code: &str) -> StepContext {
        let instance = QqqInstance::new()
            .with_backend("memory", Arc::new(MemoryBackend::new("memory")))
            .with_table(TableMetaData::new("shape", "memory").with_field("name", FieldType::String));
        let mut definition = ProcessConfig::new("p", "shape", "shape");
        definition.load_code = load_code.to_string();
        let values = ProcessValues::from_definition(&definition);
        StepContext::new(Arc::new(instance), Arc::new(definition), values, None)
    }

    #[tokio::test]
    async fn test_insert_or_update_by_primary_key() {
        let ctx = context("insert_or_update");
        let tx = LoadTransaction::Unsupported;
        let mut summary = ProcessSummary::new();
        let step = TableLoad::new(LoadMode::InsertOrUpdate);

        step.load(&ctx, vec![Record::new().with_value("name", "Square")], &tx, &mut summary)
            .await
            .unwrap();
        step.load(
            &ctx,
            vec![
                Record::new().with_value("id", 1).with_value("name", "Circle"),
                Record::new().with_value("name", "Triangle"),
            ],
            &tx,
            &mut summary,
        )
        .await
        .unwrap();

        assert_eq!(summary.count(Status::Ok), 3);
        assert_eq!(summary.line(Status::Ok, "records were updated").unwrap().count, 1);

        let rows = actions::query_records(ctx.instance(), "shape", QueryFilter::new()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("name"), Some(&Value::from("Circle")));
    }

    #[tokio::test]
    async fn test_delete_reports_missing_rows() {
        let ctx = context("delete");
        let tx = LoadTransaction::Unsupported;
        let mut summary = ProcessSummary::new();

        actions::insert(ctx.instance(), "shape", vec![Record::new().with_value("name", "Square")], &tx)
            .await
            .unwrap();

        let output = TableLoad::new(LoadMode::Delete)
            .load(
                &ctx,
                vec![Record::new().with_value("id", 1), Record::new().with_value("id", 7)],
                &tx,
                &mut summary,
            )
            .await
            .unwrap();

        assert!(!output[0].has_errors());
        assert_eq!(output[1].errors()[0].message, "No record was found to delete for Id = 7");
        assert_eq!(summary.count(Status::Ok), 1);
        assert_eq!(summary.count(Status::Error), 1);
    }
}
