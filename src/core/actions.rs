//! Table actions
//!
//! The entry points used by processes and the CLI to read and write tables by
//! name. Lookups against cache tables are routed through the cache resolver
//! unless the caller asks for the cache table's own storage.

use crate::adapters::backend::{
    DeleteInput, DeleteOutput, LoadTransaction, QueryHint, QueryInput, QueryOutput,
};
use crate::core::cache::{resolver, unique_key};
use crate::core::instance::QqqInstance;
use crate::domain::filter::{FilterCriteria, QueryFilter};
use crate::domain::record::{Record, Value};
use crate::domain::Result;
use indexmap::IndexMap;
use std::collections::HashSet;

/// How a single record is identified for [`get`]
#[derive(Debug, Clone, PartialEq)]
pub enum GetKey {
    /// By primary key value
    PrimaryKey(Value),
    /// By the values of every field of one unique key
    UniqueKey(IndexMap<String, Value>),
}

/// Input to [`get`]
#[derive(Debug, Clone)]
pub struct GetInput {
    /// Record identity
    pub key: GetKey,

    /// Hints
    pub hints: HashSet<QueryHint>,
}

impl GetInput {
    /// Look up by primary key
    pub fn by_primary_key(value: impl Into<Value>) -> Self {
        Self {
            key: GetKey::PrimaryKey(value.into()),
            hints: HashSet::new(),
        }
    }

    /// Look up by unique key field values
    pub fn by_unique_key<I, S, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        Self {
            key: GetKey::UniqueKey(
                values
                    .into_iter()
                    .map(|(field, value)| (field.into(), value.into()))
                    .collect(),
            ),
            hints: HashSet::new(),
        }
    }

    /// Builder: add a hint
    pub fn with_hint(mut self, hint: QueryHint) -> Self {
        self.hints.insert(hint);
        self
    }
}

/// Fetch one record
///
/// # Errors
///
/// Returns an error for an unknown table or a failed query
pub async fn get(instance: &QqqInstance, table_name: &str, input: &GetInput) -> Result<Option<Record>> {
    let table = instance.table(table_name)?;

    if table.is_cache_table() && !input.hints.contains(&QueryHint::DoNotQuerySourceTable) {
        return resolver::get(instance, table, &input.key).await;
    }

    let filter = match &input.key {
        GetKey::PrimaryKey(value) => QueryFilter::new().with_criteria(FilterCriteria::equals(
            table.primary_key_field.clone(),
            value.clone(),
        )),
        GetKey::UniqueKey(values) => values.iter().fold(QueryFilter::new(), |filter, (field, value)| {
            filter.with_criteria(FilterCriteria::equals(field.clone(), value.clone()))
        }),
    }
    .with_limit(1);

    let mut output = QueryOutput::list();
    instance
        .backend_for(table)?
        .query(table, &QueryInput::new(filter), &mut output)
        .await?;
    Ok(output.into_records().into_iter().next())
}

/// Run a query, emitting records into `output`
///
/// # Errors
///
/// Returns an error for an unknown table, an invalid filter or a failed query
pub async fn query(
    instance: &QqqInstance,
    table_name: &str,
    input: &QueryInput<'_>,
    output: &mut QueryOutput,
) -> Result<()> {
    let table = instance.table(table_name)?;
    input.filter.validate()?;

    if table.is_cache_table() && !input.has_hint(QueryHint::DoNotQuerySourceTable) {
        return resolver::query(instance, table, input, output).await;
    }

    instance.backend_for(table)?.query(table, input, output).await
}

/// Run a query and collect its records
///
/// # Errors
///
/// See [`query`]
pub async fn query_records(
    instance: &QqqInstance,
    table_name: &str,
    filter: QueryFilter,
) -> Result<Vec<Record>> {
    let mut output = QueryOutput::list();
    query(instance, table_name, &QueryInput::new(filter), &mut output).await?;
    Ok(output.into_records())
}

/// Count the records matching a filter
///
/// # Errors
///
/// Returns an error for an unknown table or a failed count
pub async fn count(instance: &QqqInstance, table_name: &str, filter: &QueryFilter) -> Result<usize> {
    let table = instance.table(table_name)?;
    filter.validate()?;
    instance.backend_for(table)?.count(table, filter).await
}

/// Insert records
///
/// Records whose unique-key values already exist (or repeat within the batch)
/// come back with an error and are not sent to the backend. Output order
/// matches input order.
///
/// # Errors
///
/// Returns an error for an unknown table or a failed backend call
pub async fn insert(
    instance: &QqqInstance,
    table_name: &str,
    mut records: Vec<Record>,
    transaction: &LoadTransaction,
) -> Result<Vec<Record>> {
    let table = instance.table(table_name)?;
    let backend = instance.backend_for(table)?;

    unique_key::unique_key_errors(instance, transaction, table, &mut records).await?;

    let mut slots = Vec::with_capacity(records.len());
    let mut to_insert = Vec::new();
    for record in records {
        if record.has_errors() {
            slots.push(Some(record));
        } else {
            slots.push(None);
            to_insert.push(record);
        }
    }

    let mut inserted = backend.insert(table, to_insert, transaction).await?.into_iter();
    Ok(slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| inserted.next()))
        .collect())
}

/// Update records by primary key
///
/// # Errors
///
/// Returns an error for an unknown table or a failed backend call
pub async fn update(
    instance: &QqqInstance,
    table_name: &str,
    records: Vec<Record>,
    transaction: &LoadTransaction,
) -> Result<Vec<Record>> {
    let table = instance.table(table_name)?;
    instance.backend_for(table)?.update(table, records, transaction).await
}

/// Delete records by primary key or filter
///
/// # Errors
///
/// Returns an error for an unknown table or a failed backend call
pub async fn delete(
    instance: &QqqInstance,
    table_name: &str,
    input: DeleteInput,
    transaction: &LoadTransaction,
) -> Result<DeleteOutput> {
    let table = instance.table(table_name)?;
    if let DeleteInput::Filter(filter) = &input {
        filter.validate()?;
    }
    instance.backend_for(table)?.delete(table, input, transaction).await
}

/// Open a transaction on a table's backend
///
/// # Errors
///
/// Returns an error for an unknown table or if the backend fails to open one
pub async fn open_transaction(instance: &QqqInstance, table_name: &str) -> Result<LoadTransaction> {
    let table = instance.table(table_name)?;
    instance.backend_for(table)?.open_transaction(table).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryBackend;
    use crate::domain::table::{FieldType, TableMetaData, UniqueKey};
    use std::sync::Arc;

    fn instance() -> QqqInstance {
        QqqInstance::new()
            .with_backend("memory", Arc::new(MemoryBackend::new("memory")))
            .with_table(
                TableMetaData::new("person", "memory")
                    .with_field("email", FieldType::String)
                    .with_field("firstName", FieldType::String)
                    .with_unique_key(UniqueKey::new(["email"])),
            )
    }

    #[tokio::test]
    async fn test_insert_keeps_order_and_flags_duplicates() {
        let instance = instance();
        let tx = LoadTransaction::Unsupported;

        insert(&instance, "person", vec![Record::new().with_value("email", "a@kingsrook.com")], &tx)
            .await
            .unwrap();

        let output = insert(
            &instance,
            "person",
            vec![
                Record::new().with_value("email", "b@kingsrook.com"),
                Record::new().with_value("email", "a@kingsrook.com"),
                Record::new().with_value("email", "c@kingsrook.com"),
            ],
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[0].value("email"), Some(&Value::from("b@kingsrook.com")));
        assert_eq!(output[1].errors()[0].message, "Another record already exists with this email");
        assert!(output[2].value("id").is_some());
        assert_eq!(count(&instance, "person", &QueryFilter::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_get_by_primary_and_unique_key() {
        let instance = instance();
        let inserted = insert(
            &instance,
            "person",
            vec![Record::new().with_value("email", "d@kingsrook.com").with_value("firstName", "Darin")],
            &LoadTransaction::Unsupported,
        )
        .await
        .unwrap();
        let id = inserted[0].value("id").cloned().unwrap();

        let by_id = get(&instance, "person", &GetInput::by_primary_key(id)).await.unwrap();
        assert_eq!(by_id.unwrap().value("firstName"), Some(&Value::from("Darin")));

        let by_key = get(&instance, "person", &GetInput::by_unique_key([("email", "d@kingsrook.com")]))
            .await
            .unwrap();
        assert!(by_key.is_some());

        let missing = get(&instance, "person", &GetInput::by_primary_key(999)).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_primary_key_reports_error() {
        let instance = instance();
        let output = delete(
            &instance,
            "person",
            DeleteInput::PrimaryKeys(vec![Value::from(42)]),
            &LoadTransaction::Unsupported,
        )
        .await
        .unwrap();

        assert_eq!(output.deleted_count, 0);
        assert_eq!(
            output.records_with_errors[0].errors()[0].message,
            "No record was found to delete for Id = 42"
        );
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let instance = instance();
        assert!(query_records(&instance, "nope", QueryFilter::new()).await.is_err());
    }
}
