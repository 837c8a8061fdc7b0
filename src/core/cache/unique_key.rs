//! Unique-key existence checks
//!
//! Given candidate records, finds which of their unique-key tuples already exist
//! in a table. Tuples are deduplicated and paged so one query never carries more
//! than `cache.unique_key_page_size` tuples.

use crate::adapters::backend::{LoadTransaction, QueryHint, QueryInput, QueryOutput};
use crate::core::actions;
use crate::core::instance::QqqInstance;
use crate::domain::filter::{BooleanOperator, FilterCriteria, QueryFilter};
use crate::domain::record::{KeyTuple, Record, Value};
use crate::domain::table::{TableMetaData, UniqueKey};
use crate::domain::Result;
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

/// Find which unique-key tuples of `records` already exist in `table`
///
/// Returns a map from each existing tuple to the primary key of the row holding
/// it. Records with a null value in any key field are skipped. An empty candidate
/// set returns an empty map without querying.
///
/// # Arguments
///
/// * `instance` - Instance the table belongs to
/// * `transaction` - Transaction the existence queries read through
/// * `table` - Table to check
/// * `records` - Candidate records
/// * `unique_key` - Key whose tuples are checked
/// * `allow_querying_source_table` - For a cache table, whether a lookup may fall
///   through to the source table. When false the cache table's own storage is the
///   only thing consulted.
///
/// # Errors
///
/// Propagates query failures
pub async fn get_existing_keys(
    instance: &QqqInstance,
    transaction: &LoadTransaction,
    table: &TableMetaData,
    records: &[Record],
    unique_key: &UniqueKey,
    allow_querying_source_table: bool,
) -> Result<HashMap<KeyTuple, Value>> {
    let tuples = distinct_tuples(records, unique_key);
    if tuples.is_empty() {
        return Ok(HashMap::new());
    }

    let page_size = instance.cache_config().unique_key_page_size.max(1);
    let mut existing = HashMap::new();

    for page in tuples.chunks(page_size) {
        let mut input =
            QueryInput::new(tuples_filter(&unique_key.fields, page)).with_transaction(transaction);
        if !allow_querying_source_table {
            input = input.with_hint(QueryHint::DoNotQuerySourceTable);
        }

        let mut output = QueryOutput::list();
        actions::query(instance, &table.name, &input, &mut output).await?;

        for row in output.into_records() {
            if let Some(tuple) = unique_key.tuple_of(&row) {
                existing.insert(tuple, row.value_or_null(&table.primary_key_field).clone());
            }
        }
    }

    tracing::debug!(
        table = %table.name,
        key = %unique_key.describe(),
        candidates = tuples.len(),
        existing = existing.len(),
        "Checked unique key existence"
    );

    Ok(existing)
}

/// Attach an error to every record whose tuple, for any of the table's unique
/// keys, already exists in the table or appears earlier in the same batch
///
/// Records that already carry errors are left alone.
///
/// # Errors
///
/// Propagates query failures
pub async fn unique_key_errors(
    instance: &QqqInstance,
    transaction: &LoadTransaction,
    table: &TableMetaData,
    records: &mut [Record],
) -> Result<()> {
    for unique_key in &table.unique_keys {
        let existing =
            get_existing_keys(instance, transaction, table, records, unique_key, false).await?;

        let mut seen = HashSet::new();
        for record in records.iter_mut() {
            if record.has_errors() {
                continue;
            }
            let Some(tuple) = unique_key.tuple_of(record) else {
                continue;
            };
            if existing.contains_key(&tuple) || !seen.insert(tuple) {
                record.add_error(format!(
                    "Another record already exists with this {}",
                    unique_key.describe()
                ));
            }
        }
    }
    Ok(())
}

/// Rows of `table` holding any of `tuples` on `fields`, read straight from the
/// table's backend in pages
///
/// # Errors
///
/// Propagates backend failures
pub(crate) async fn fetch_by_tuples(
    instance: &QqqInstance,
    table: &TableMetaData,
    fields: &[String],
    tuples: &[KeyTuple],
) -> Result<Vec<Record>> {
    let backend = instance.backend_for(table)?;
    let page_size = instance.cache_config().unique_key_page_size.max(1);
    let mut rows = Vec::new();

    for page in tuples.chunks(page_size) {
        let input = QueryInput::new(tuples_filter(fields, page));
        let mut output = QueryOutput::list();
        backend.query(table, &input, &mut output).await?;
        rows.extend(output.into_records());
    }
    Ok(rows)
}

/// Distinct non-null tuples, in first-seen order
pub(crate) fn distinct_tuples(records: &[Record], unique_key: &UniqueKey) -> Vec<KeyTuple> {
    records
        .iter()
        .filter_map(|record| unique_key.tuple_of(record))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Filter matching any of `tuples`: `IN` for a single field, OR of ANDs otherwise
pub(crate) fn tuples_filter(fields: &[String], tuples: &[KeyTuple]) -> QueryFilter {
    if let [field] = fields {
        return QueryFilter::new().with_criteria(FilterCriteria::in_list(
            field.clone(),
            tuples.iter().filter_map(|t| t.first().cloned()),
        ));
    }

    tuples.iter().fold(
        QueryFilter::new().with_boolean_operator(BooleanOperator::Or),
        |filter, tuple| {
            let tuple_filter = fields.iter().zip(tuple).fold(QueryFilter::new(), |f, (field, value)| {
                f.with_criteria(FilterCriteria::equals(field.clone(), value.clone()))
            });
            filter.with_sub_filter(tuple_filter)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryBackend;
    use crate::config::schema::CacheConfig;
    use crate::domain::table::FieldType;
    use std::sync::Arc;

    fn person_table() -> TableMetaData {
        TableMetaData::new("person", "memory")
            .with_field("firstName", FieldType::String)
            .with_field("lastName", FieldType::String)
            .with_unique_key(UniqueKey::new(["firstName", "lastName"]))
    }

    fn person(first: &str, last: &str) -> Record {
        Record::new()
            .with_value("firstName", first)
            .with_value("lastName", last)
    }

    async fn instance_with_people(page_size: usize) -> (QqqInstance, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new("memory"));
        let instance = QqqInstance::new()
            .with_backend("memory", backend.clone())
            .with_table(person_table())
            .with_cache_config(CacheConfig {
                unique_key_page_size: page_size,
            });

        actions::insert(
            &instance,
            "person",
            vec![person("Darin", "Kelkhoff"), person("James", "Maes"), person("Tim", "Chamberlain")],
            &LoadTransaction::Unsupported,
        )
        .await
        .unwrap();
        backend.reset_statistics();

        (instance, backend)
    }

    #[tokio::test]
    async fn test_empty_candidates_issue_no_query() {
        let (instance, backend) = instance_with_people(1000).await;
        let table = instance.table("person").unwrap().clone();

        let existing = get_existing_keys(
            &instance,
            &LoadTransaction::Unsupported,
            &table,
            &[],
            &table.unique_keys[0],
            false,
        )
        .await
        .unwrap();

        assert!(existing.is_empty());
        assert_eq!(backend.statistics("person").queries, 0);
    }

    #[tokio::test]
    async fn test_existing_keys_are_paged_and_deduplicated() {
        let (instance, backend) = instance_with_people(2).await;
        let table = instance.table("person").unwrap().clone();

        let candidates = vec![
            person("Darin", "Kelkhoff"),
            person("Darin", "Kelkhoff"),
            person("James", "Maes"),
            person("Garret", "Richardson"),
            Record::new().with_value("firstName", "Nobody"),
        ];

        let existing = get_existing_keys(
            &instance,
            &LoadTransaction::Unsupported,
            &table,
            &candidates,
            &table.unique_keys[0],
            false,
        )
        .await
        .unwrap();

        assert_eq!(existing.len(), 2);
        assert!(existing.contains_key(&vec![Value::from("Darin"), Value::from("Kelkhoff")]));
        assert!(existing.contains_key(&vec![Value::from("James"), Value::from("Maes")]));
        // three distinct tuples in pages of two
        assert_eq!(backend.statistics("person").queries, 2);
    }

    #[tokio::test]
    async fn test_unique_key_errors_flag_existing_and_batch_duplicates() {
        let (instance, _backend) = instance_with_people(1000).await;
        let table = instance.table("person").unwrap().clone();

        let mut batch = vec![
            person("Darin", "Kelkhoff"),
            person("Garret", "Richardson"),
            person("Garret", "Richardson"),
        ];
        unique_key_errors(&instance, &LoadTransaction::Unsupported, &table, &mut batch)
            .await
            .unwrap();

        assert_eq!(
            batch[0].errors()[0].message,
            "Another record already exists with this firstName and lastName"
        );
        assert!(!batch[1].has_errors());
        assert!(batch[2].has_errors());
    }

    #[test]
    fn test_tuples_filter_shapes() {
        let single = tuples_filter(
            &["id".to_string()],
            &[vec![Value::from(1)], vec![Value::from(2)]],
        );
        assert_eq!(single.criteria.len(), 1);
        assert_eq!(single.criteria[0].values.len(), 2);

        let multi = tuples_filter(
            &["firstName".to_string(), "lastName".to_string()],
            &[vec![Value::from("a"), Value::from("b")]],
        );
        assert_eq!(multi.boolean_operator, BooleanOperator::Or);
        assert_eq!(multi.sub_filters.len(), 1);
        assert_eq!(multi.sub_filters[0].criteria.len(), 2);
    }
}
