//! Read-through cache resolver
//!
//! Serves get/query lookups on a cache table. Fresh cache rows are returned as
//! they are. Missing or stale keys are fetched from the source table and written
//! back with a new cached date, unless a use-case exclusion rule matches. Stale
//! rows whose source row is gone are deleted.
//!
//! Only lookups by the fields of a use case's cache unique key are cached. Any
//! other filter shape is answered from the source table without touching the
//! cache.

use crate::adapters::backend::{DeleteInput, LoadTransaction, QueryInput, QueryOutput};
use crate::core::actions::GetKey;
use crate::core::cache::unique_key;
use crate::core::instance::QqqInstance;
use crate::domain::filter::{BooleanOperator, FilterCriteria, Operator, QueryFilter};
use crate::domain::record::{KeyTuple, Record, Value};
use crate::domain::table::{CacheOf, CacheUseCase, TableMetaData, UniqueKey};
use crate::domain::{QqqError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

/// Resolve a query on a cache table
pub(crate) async fn query(
    instance: &QqqInstance,
    table: &TableMetaData,
    input: &QueryInput<'_>,
    output: &mut QueryOutput,
) -> Result<()> {
    let cache_of = cache_of(table)?;

    let Some((use_case, tuples)) = cacheable_lookup(cache_of, &input.filter) else {
        tracing::debug!(
            table = %table.name,
            "Filter shape is not served by the cache, querying source table directly"
        );
        return query_source_directly(instance, table, cache_of, &input.filter, output).await;
    };

    let mut records = resolve(instance, table, cache_of, use_case, tuples).await?;
    if let Some(limit) = input.filter.limit {
        records.truncate(limit);
    }
    output.add_records(records).await
}

/// Resolve a single-record lookup on a cache table
pub(crate) async fn get(
    instance: &QqqInstance,
    table: &TableMetaData,
    key: &GetKey,
) -> Result<Option<Record>> {
    let cache_of = cache_of(table)?;

    match key {
        GetKey::UniqueKey(values) => {
            let use_case = cache_of.use_cases.iter().find(|uc| {
                uc.cache_unique_key.fields.len() == values.len()
                    && uc.cache_unique_key.fields.iter().all(|f| values.contains_key(f))
            });

            let Some(use_case) = use_case else {
                tracing::debug!(table = %table.name, "No cache use case for lookup fields, querying source table directly");
                let filter = values
                    .iter()
                    .fold(QueryFilter::new(), |filter, (field, value)| {
                        filter.with_criteria(FilterCriteria::equals(field.clone(), value.clone()))
                    })
                    .with_limit(1);
                let mut output = QueryOutput::list();
                query_source_directly(instance, table, cache_of, &filter, &mut output).await?;
                return Ok(output.into_records().into_iter().next());
            };

            let tuple: KeyTuple = use_case
                .cache_unique_key
                .fields
                .iter()
                .map(|f| values.get(f).cloned().unwrap_or(Value::Null))
                .collect();
            if tuple.iter().any(Value::is_null) {
                return Ok(None);
            }

            let records = resolve(instance, table, cache_of, use_case, vec![tuple]).await?;
            Ok(records.into_iter().next())
        }
        GetKey::PrimaryKey(primary_key) => {
            let filter = QueryFilter::new()
                .with_criteria(FilterCriteria::equals(
                    table.primary_key_field.clone(),
                    primary_key.clone(),
                ))
                .with_limit(1);
            let mut output = QueryOutput::list();
            instance
                .backend_for(table)?
                .query(table, &QueryInput::new(filter), &mut output)
                .await?;

            let Some(row) = output.into_records().into_iter().next() else {
                return Ok(None);
            };
            if is_fresh(&row, cache_of, Utc::now()) {
                return Ok(Some(row));
            }

            let key = cache_of
                .use_cases
                .iter()
                .find_map(|uc| uc.cache_unique_key.tuple_of(&row).map(|t| (uc, t)));
            match key {
                Some((use_case, tuple)) => {
                    let records = resolve(instance, table, cache_of, use_case, vec![tuple]).await?;
                    Ok(records.into_iter().next())
                }
                None => Ok(Some(row)),
            }
        }
    }
}

fn cache_of(table: &TableMetaData) -> Result<&CacheOf> {
    table
        .cache_of
        .as_ref()
        .ok_or_else(|| QqqError::Configuration(format!("Table '{}' is not a cache table", table.name)))
}

/// Use case and requested key tuples, when the filter is a lookup by a
/// single-field cache key: `Equals`/`In` criteria on that one field, joined by
/// `Or` when there are several, with no sub-filters, ordering or skip
fn cacheable_lookup<'a>(
    cache_of: &'a CacheOf,
    filter: &QueryFilter,
) -> Option<(&'a CacheUseCase, Vec<KeyTuple>)> {
    if !filter.sub_filters.is_empty() || !filter.order_bys.is_empty() || filter.skip.is_some() {
        return None;
    }

    let first = filter.criteria.first()?;
    if filter.criteria.len() > 1 && filter.boolean_operator != BooleanOperator::Or {
        return None;
    }

    let field = &first.field_name;
    let supported = filter.criteria.iter().all(|c| {
        &c.field_name == field && matches!(c.operator, Operator::Equals | Operator::In)
    });
    if !supported {
        return None;
    }

    let use_case = cache_of.use_case_for_fields(std::slice::from_ref(field))?;

    let tuples = filter
        .criteria
        .iter()
        .flat_map(|c| c.values.iter())
        .filter(|v| !v.is_null())
        .map(|v| vec![v.clone()])
        .collect::<IndexSet<KeyTuple>>()
        .into_iter()
        .collect();

    Some((use_case, tuples))
}

fn is_fresh(row: &Record, cache_of: &CacheOf, now: DateTime<Utc>) -> bool {
    let ttl_ms = i64::try_from(cache_of.expiration_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
    row.value(&cache_of.cached_date_field)
        .and_then(Value::as_datetime)
        .is_some_and(|cached| now.signed_duration_since(cached).num_milliseconds() < ttl_ms)
}

/// Core of the read-through: cache check, source fallback, reconciliation
async fn resolve(
    instance: &QqqInstance,
    cache_table: &TableMetaData,
    cache_of: &CacheOf,
    use_case: &CacheUseCase,
    tuples: Vec<KeyTuple>,
) -> Result<Vec<Record>> {
    if tuples.is_empty() {
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let source_table = instance.table(&cache_of.source_table)?;
    let cache_key = &use_case.cache_unique_key;
    let pk_field = &cache_table.primary_key_field;

    let tuples: Vec<KeyTuple> = tuples
        .into_iter()
        .map(|t| typed_tuple(cache_table, cache_key, t))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect();

    let cached_rows =
        unique_key::fetch_by_tuples(instance, cache_table, &cache_key.fields, &tuples).await?;

    let mut fresh = Vec::new();
    let mut fresh_keys = HashSet::new();
    let mut stale: HashMap<KeyTuple, Value> = HashMap::new();
    for row in cached_rows {
        let Some(tuple) = cache_tuple_of(cache_table, cache_key, &row) else {
            continue;
        };
        if is_fresh(&row, cache_of, now) {
            fresh_keys.insert(tuple);
            fresh.push(row);
        } else {
            stale.insert(tuple, row.value_or_null(pk_field).clone());
        }
    }
    stale.retain(|tuple, _| !fresh_keys.contains(tuple));

    let missing: Vec<KeyTuple> = tuples
        .into_iter()
        .filter(|t| !fresh_keys.contains(t))
        .collect();
    if missing.is_empty() {
        crate::log_cache_result!(cache_table.name, fresh.len(), 0usize, 0usize);
        return Ok(fresh);
    }

    let source_rows = unique_key::fetch_by_tuples(
        instance,
        source_table,
        &use_case.source_unique_key.fields,
        &missing,
    )
    .await?;

    let mut found = HashSet::new();
    let mut excluded = Vec::new();
    let mut writes = Vec::new();
    for source_row in source_rows {
        let Some(tuple) = use_case
            .source_unique_key
            .tuple_of(&source_row)
            .map(|t| typed_tuple(cache_table, cache_key, t))
        else {
            continue;
        };
        if !found.insert(tuple.clone()) {
            continue;
        }

        let mut record = cache_record_from_source(
            cache_table,
            cache_of,
            source_table,
            &source_row,
            use_case.copy_source_primary_key,
        );

        if use_case.is_excluded(&source_row) {
            tracing::trace!(table = %cache_table.name, "Source record excluded from cache");
            excluded.push(record);
            continue;
        }

        record.set_value(cache_of.cached_date_field.clone(), now);
        if let Some(stale_pk) = stale.get(&tuple).filter(|pk| !pk.is_null()) {
            record.set_value(pk_field.clone(), stale_pk.clone());
            writes.push((true, record));
        } else {
            writes.push((false, record));
        }
    }

    let vanished: Vec<Value> = stale
        .iter()
        .filter(|(tuple, pk)| !found.contains(*tuple) && !pk.is_null())
        .map(|(_, pk)| pk.clone())
        .collect();
    let removed = vanished.len();
    if !vanished.is_empty() {
        instance
            .backend_for(cache_table)?
            .delete(cache_table, DeleteInput::PrimaryKeys(vanished), &LoadTransaction::Unsupported)
            .await?;
    }

    let fetched = writes.len() + excluded.len();
    let mut records = fresh;
    records.extend(upsert(instance, cache_table, use_case, writes).await?);
    records.extend(excluded);

    crate::log_cache_result!(cache_table.name, fresh_keys.len(), fetched, removed);
    Ok(records)
}

/// Write fetched records to the cache table, keyed by the cache unique key
///
/// `writes` pairs each record with whether it replaces a known stale row. Rows to
/// insert are re-checked against the cache just before inserting, and an insert
/// that still clashes becomes an update of the row that won.
async fn upsert(
    instance: &QqqInstance,
    cache_table: &TableMetaData,
    use_case: &CacheUseCase,
    writes: Vec<(bool, Record)>,
) -> Result<Vec<Record>> {
    if writes.is_empty() {
        return Ok(Vec::new());
    }

    let backend = instance.backend_for(cache_table)?;
    let cache_key = &use_case.cache_unique_key;
    let pk_field = &cache_table.primary_key_field;

    let (updates, inserts): (Vec<_>, Vec<_>) = writes.into_iter().partition(|(is_update, _)| *is_update);
    let mut updates: Vec<Record> = updates.into_iter().map(|(_, r)| r).collect();
    let inserts: Vec<Record> = inserts.into_iter().map(|(_, r)| r).collect();

    let existing = existing_cache_keys(instance, cache_table, use_case, &inserts).await?;
    let mut to_insert = Vec::new();
    for mut record in inserts {
        match cache_tuple_of(cache_table, cache_key, &record).and_then(|t| existing.get(&t)) {
            Some(pk) => {
                record.set_value(pk_field.clone(), pk.clone());
                updates.push(record);
            }
            None => to_insert.push(record),
        }
    }

    let mut written = Vec::new();
    if !to_insert.is_empty() {
        let (inserted, clashed): (Vec<_>, Vec<_>) = backend
            .insert(cache_table, to_insert, &LoadTransaction::Unsupported)
            .await?
            .into_iter()
            .partition(|r| !r.has_errors());
        written.extend(inserted);

        if !clashed.is_empty() {
            let existing = existing_cache_keys(instance, cache_table, use_case, &clashed).await?;
            for mut record in clashed {
                match cache_tuple_of(cache_table, cache_key, &record).and_then(|t| existing.get(&t)) {
                    Some(pk) => {
                        record.clear_annotations();
                        record.set_value(pk_field.clone(), pk.clone());
                        updates.push(record);
                    }
                    None => {
                        tracing::warn!(
                            table = %cache_table.name,
                            errors = ?record.errors(),
                            "Failed to write record to cache"
                        );
                        record.clear_annotations();
                        written.push(record);
                    }
                }
            }
        }
    }

    if !updates.is_empty() {
        for mut record in backend
            .update(cache_table, updates, &LoadTransaction::Unsupported)
            .await?
        {
            if record.has_errors() {
                tracing::warn!(
                    table = %cache_table.name,
                    errors = ?record.errors(),
                    "Failed to refresh cached record"
                );
            }
            record.clear_annotations();
            written.push(record);
        }
    }

    Ok(written)
}

/// Key tuple converted to the cache key's field types, so that lookups by
/// `7` and `7.0` on an integer key name the same row
fn typed_tuple(cache_table: &TableMetaData, cache_key: &UniqueKey, tuple: KeyTuple) -> KeyTuple {
    cache_key
        .fields
        .iter()
        .zip(tuple)
        .map(|(field, value)| match cache_table.field(field) {
            Some(meta) => meta.field_type.coerce(value.clone()).unwrap_or(value),
            None => value,
        })
        .collect()
}

fn cache_tuple_of(cache_table: &TableMetaData, cache_key: &UniqueKey, record: &Record) -> Option<KeyTuple> {
    cache_key
        .tuple_of(record)
        .map(|t| typed_tuple(cache_table, cache_key, t))
}

/// Primary keys of cache rows already holding the cache-key tuples of `records`
async fn existing_cache_keys(
    instance: &QqqInstance,
    cache_table: &TableMetaData,
    use_case: &CacheUseCase,
    records: &[Record],
) -> Result<HashMap<KeyTuple, Value>> {
    let cache_key = &use_case.cache_unique_key;
    let tuples = unique_key::distinct_tuples(records, cache_key);
    if tuples.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = unique_key::fetch_by_tuples(instance, cache_table, &cache_key.fields, &tuples).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let tuple = cache_tuple_of(cache_table, cache_key, &row)?;
            Some((tuple, row.value_or_null(&cache_table.primary_key_field).clone()))
        })
        .collect())
}

/// Source-table name of a cache-table field
fn source_field<'a>(cache_of: &'a CacheOf, cache_field: &'a str) -> &'a str {
    cache_of
        .use_cases
        .iter()
        .find_map(|uc| uc.source_field_for(cache_field))
        .unwrap_or(cache_field)
}

/// Shape a source row as a cache-table row (without cached date)
fn cache_record_from_source(
    cache_table: &TableMetaData,
    cache_of: &CacheOf,
    source_table: &TableMetaData,
    source_row: &Record,
    copy_source_primary_key: bool,
) -> Record {
    let mut record = Record::new();

    if copy_source_primary_key {
        if let Some(pk) = source_row.value(&source_table.primary_key_field) {
            record.set_value(cache_table.primary_key_field.clone(), pk.clone());
        }
    }

    for field in &cache_table.fields {
        if field.name == cache_of.cached_date_field || field.name == cache_table.primary_key_field {
            continue;
        }
        if let Some(value) = source_row.value(source_field(cache_of, &field.name)) {
            record.set_value(field.name.clone(), value.clone());
        }
    }

    record
}

/// Rewrite a cache-table filter in source-table field names
fn translate_filter(filter: &QueryFilter, cache_of: &CacheOf) -> QueryFilter {
    let mut translated = filter.clone();
    for criteria in &mut translated.criteria {
        criteria.field_name = source_field(cache_of, &criteria.field_name).to_string();
    }
    for order_by in &mut translated.order_bys {
        order_by.field_name = source_field(cache_of, &order_by.field_name).to_string();
    }
    translated.sub_filters = filter
        .sub_filters
        .iter()
        .map(|sub| translate_filter(sub, cache_of))
        .collect();
    translated
}

/// Answer a cache-table query from the source table, without reading or writing the cache
async fn query_source_directly(
    instance: &QqqInstance,
    cache_table: &TableMetaData,
    cache_of: &CacheOf,
    filter: &QueryFilter,
    output: &mut QueryOutput,
) -> Result<()> {
    let source_table = instance.table(&cache_of.source_table)?;
    let copy_source_primary_key = cache_of.use_cases.iter().any(|uc| uc.copy_source_primary_key);

    let mut source_output = QueryOutput::list();
    instance
        .backend_for(source_table)?
        .query(
            source_table,
            &QueryInput::new(translate_filter(filter, cache_of)),
            &mut source_output,
        )
        .await?;

    for source_row in source_output.into_records() {
        output
            .add_record(cache_record_from_source(
                cache_table,
                cache_of,
                source_table,
                &source_row,
                copy_source_primary_key,
            ))
            .await?;
    }
    Ok(())
}
