//! Integration tests for cache tables: read-through, expiry, exclusion and
//! concurrent lookups

use chrono::{Duration, Utc};
use qqq::adapters::backend::{DeleteInput, LoadTransaction, QueryHint, QueryInput, QueryOutput};
use qqq::adapters::memory::MemoryBackend;
use qqq::core::actions::{self, GetInput};
use qqq::core::cache::get_existing_keys;
use qqq::core::QqqInstance;
use qqq::domain::{
    CacheOf, CacheUseCase, FieldType, FilterCriteria, QueryFilter, Record, TableMetaData, UniqueKey,
    Value,
};
use std::sync::Arc;

const TIM: &str = "tim@example.com";
const DARIN: &str = "darin@example.com";

struct Fixture {
    backend: Arc<MemoryBackend>,
    instance: QqqInstance,
}

fn fixture() -> Fixture {
    let backend = Arc::new(MemoryBackend::new("memory"));

    let person = TableMetaData::new("person", "memory")
        .with_field("firstName", FieldType::String)
        .with_field("email", FieldType::String)
        .with_field("status", FieldType::Integer)
        .with_unique_key(UniqueKey::new(["email"]));

    let person_cache = TableMetaData::new("personCache", "memory")
        .with_field("firstName", FieldType::String)
        .with_field("email", FieldType::String)
        .with_field("cachedDate", FieldType::DateTime)
        .with_unique_key(UniqueKey::new(["email"]))
        .with_cache_of(CacheOf {
            source_table: "person".to_string(),
            expiration_seconds: 60,
            cached_date_field: "cachedDate".to_string(),
            use_cases: vec![CacheUseCase {
                cache_unique_key: UniqueKey::new(["email"]),
                source_unique_key: UniqueKey::new(["email"]),
                cache_source_misses: false,
                copy_source_primary_key: false,
                exclude_records_matching: vec![
                    QueryFilter::new().with_criteria(FilterCriteria::equals("status", 2)),
                ],
            }],
        });

    let instance = QqqInstance::new()
        .with_backend("memory", backend.clone())
        .with_table(person)
        .with_table(person_cache);
    instance.validate().unwrap();

    Fixture { backend, instance }
}

impl Fixture {
    async fn seed_person(&self, first_name: &str, email: &str, status: i64) -> Value {
        let inserted = actions::insert(
            &self.instance,
            "person",
            vec![Record::new()
                .with_value("firstName", first_name)
                .with_value("email", email)
                .with_value("status", status)],
            &LoadTransaction::Unsupported,
        )
        .await
        .unwrap();
        assert!(!inserted[0].has_errors());
        inserted[0].value_or_null("id").clone()
    }

    async fn lookup(&self, email: &str) -> Vec<Record> {
        let filter = QueryFilter::new().with_criteria(FilterCriteria::equals("email", email));
        actions::query_records(&self.instance, "personCache", filter)
            .await
            .unwrap()
    }

    fn source_queries(&self) -> usize {
        self.backend.statistics("person").queries
    }

    async fn cache_rows(&self) -> Vec<Record> {
        self.backend.rows("personCache").await
    }

    /// Push every cache row's cachedDate past the expiration window
    async fn expire_cache(&self) {
        let aged = Utc::now() - Duration::hours(2);
        let updates: Vec<Record> = self
            .cache_rows()
            .await
            .into_iter()
            .map(|row| {
                Record::new()
                    .with_value("id", row.value_or_null("id").clone())
                    .with_value("cachedDate", aged)
            })
            .collect();
        let updated = actions::update(&self.instance, "personCache", updates, &LoadTransaction::Unsupported)
            .await
            .unwrap();
        assert!(updated.iter().all(|r| !r.has_errors()));
    }
}

#[tokio::test]
async fn test_fresh_rows_are_served_from_cache() {
    let f = fixture();
    f.seed_person("Tim", TIM, 1).await;
    f.backend.reset_statistics();

    let first = f.lookup(TIM).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].value("firstName"), Some(&Value::from("Tim")));
    assert_eq!(f.source_queries(), 1);

    let second = f.lookup(TIM).await;
    assert_eq!(second.len(), 1);
    assert_eq!(f.source_queries(), 1);

    let rows = f.cache_rows().await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].value("cachedDate").and_then(Value::as_datetime).is_some());
}

#[tokio::test]
async fn test_expired_rows_are_refetched_and_refreshed() {
    let f = fixture();
    f.seed_person("Tim", TIM, 1).await;
    f.lookup(TIM).await;
    f.expire_cache().await;
    f.backend.reset_statistics();

    let refreshed = f.lookup(TIM).await;
    assert_eq!(refreshed.len(), 1);
    assert_eq!(f.source_queries(), 1);

    let rows = f.cache_rows().await;
    assert_eq!(rows.len(), 1);
    let cached_date = rows[0].value("cachedDate").and_then(Value::as_datetime).unwrap();
    assert!(Utc::now() - cached_date < Duration::minutes(1));
}

#[tokio::test]
async fn test_source_changes_flow_into_refreshed_rows() {
    let f = fixture();
    let pk = f.seed_person("Tim", TIM, 1).await;
    f.lookup(TIM).await;

    actions::update(
        &f.instance,
        "person",
        vec![Record::new().with_value("id", pk).with_value("firstName", "Timothy")],
        &LoadTransaction::Unsupported,
    )
    .await
    .unwrap();

    // still fresh, so the old value is served
    assert_eq!(f.lookup(TIM).await[0].value("firstName"), Some(&Value::from("Tim")));

    f.expire_cache().await;
    assert_eq!(
        f.lookup(TIM).await[0].value("firstName"),
        Some(&Value::from("Timothy"))
    );
    assert_eq!(f.cache_rows().await.len(), 1);
}

#[tokio::test]
async fn test_excluded_records_are_returned_but_not_cached() {
    let f = fixture();
    f.seed_person("Darin", DARIN, 2).await;

    let found = f.lookup(DARIN).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value("email"), Some(&Value::from(DARIN)));
    assert!(f.cache_rows().await.is_empty());

    let mut output = QueryOutput::list();
    let filter = QueryFilter::new().with_criteria(FilterCriteria::equals("email", DARIN));
    actions::query(
        &f.instance,
        "personCache",
        &QueryInput::new(filter).with_hint(QueryHint::DoNotQuerySourceTable),
        &mut output,
    )
    .await
    .unwrap();
    assert_eq!(output.count(), 0);
}

#[tokio::test]
async fn test_deleted_source_rows_leave_cache_on_next_refetch() {
    let f = fixture();
    let pk = f.seed_person("Tim", TIM, 1).await;
    f.lookup(TIM).await;

    let deleted = actions::delete(
        &f.instance,
        "person",
        DeleteInput::PrimaryKeys(vec![pk]),
        &LoadTransaction::Unsupported,
    )
    .await
    .unwrap();
    assert_eq!(deleted.deleted_count, 1);

    // served from the fresh cache row until it expires
    assert_eq!(f.lookup(TIM).await.len(), 1);
    assert_eq!(f.cache_rows().await.len(), 1);

    f.expire_cache().await;
    assert!(f.lookup(TIM).await.is_empty());
    assert!(f.cache_rows().await.is_empty());
    assert!(f.lookup(TIM).await.is_empty());
}

#[tokio::test]
async fn test_unsupported_filter_bypasses_cache() {
    let f = fixture();
    f.seed_person("Tim", TIM, 1).await;
    f.seed_person("Darin", DARIN, 1).await;

    let filter = QueryFilter::new().with_criteria(FilterCriteria::equals("firstName", "Tim"));
    let found = actions::query_records(&f.instance, "personCache", filter)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value("email"), Some(&Value::from(TIM)));
    assert!(found[0].value("status").is_none());
    assert!(f.cache_rows().await.is_empty());
}

#[tokio::test]
async fn test_in_lookup_mixes_cached_and_fetched() {
    let f = fixture();
    f.seed_person("Tim", TIM, 1).await;
    f.seed_person("Darin", DARIN, 1).await;
    f.lookup(TIM).await;
    f.backend.reset_statistics();

    let filter = QueryFilter::new().with_criteria(FilterCriteria::in_list(
        "email",
        [TIM, DARIN, "nobody@example.com"],
    ));
    let found = actions::query_records(&f.instance, "personCache", filter)
        .await
        .unwrap();

    let mut emails: Vec<&str> = found
        .iter()
        .filter_map(|r| r.value("email").and_then(Value::as_str))
        .collect();
    emails.sort_unstable();
    assert_eq!(emails, vec![DARIN, TIM]);
    assert_eq!(f.source_queries(), 1);
    assert_eq!(f.cache_rows().await.len(), 2);
}

#[tokio::test]
async fn test_get_by_unique_key() {
    let f = fixture();
    f.seed_person("Tim", TIM, 1).await;

    let found = actions::get(&f.instance, "personCache", &GetInput::by_unique_key([("email", TIM)]))
        .await
        .unwrap();
    assert_eq!(found.unwrap().value("firstName"), Some(&Value::from("Tim")));

    let missing = actions::get(
        &f.instance,
        "personCache",
        &GetInput::by_unique_key([("email", "nobody@example.com")]),
    )
    .await
    .unwrap();
    assert!(missing.is_none());
    assert_eq!(f.cache_rows().await.len(), 1);
}

#[tokio::test]
async fn test_existing_keys_respect_source_table_hint() {
    let f = fixture();
    f.seed_person("Tim", TIM, 1).await;
    f.backend.reset_statistics();

    let cache_table = f.instance.table("personCache").unwrap().clone();
    let key = UniqueKey::new(["email"]);
    let candidates = vec![
        Record::new().with_value("email", TIM),
        Record::new().with_value("email", TIM),
    ];

    let cache_only = get_existing_keys(
        &f.instance,
        &LoadTransaction::Unsupported,
        &cache_table,
        &candidates,
        &key,
        false,
    )
    .await
    .unwrap();
    assert!(cache_only.is_empty());
    assert_eq!(f.source_queries(), 0);

    let with_source = get_existing_keys(
        &f.instance,
        &LoadTransaction::Unsupported,
        &cache_table,
        &candidates,
        &key,
        true,
    )
    .await
    .unwrap();
    assert_eq!(with_source.len(), 1);
    assert!(with_source.contains_key(&vec![Value::from(TIM)]));
    assert_eq!(f.source_queries(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_do_not_duplicate_rows() {
    let f = Arc::new(fixture());
    f.seed_person("Tim", TIM, 1).await;

    let lookups = (0..8).map(|_| {
        let f = f.clone();
        async move { f.lookup(TIM).await }
    });
    let results = futures::future::join_all(lookups).await;

    assert!(results.iter().all(|records| records.len() == 1));
    assert_eq!(f.cache_rows().await.len(), 1);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let f = f.clone();
            tokio::spawn(async move {
                f.expire_cache().await;
                f.lookup(TIM).await
            })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().len(), 1);
    }
    assert_eq!(f.cache_rows().await.len(), 1);
}

#[tokio::test]
async fn test_stale_row_kept_when_source_now_excluded() {
    let f = fixture();
    let pk = f.seed_person("Tim", TIM, 1).await;
    f.lookup(TIM).await;
    f.expire_cache().await;
    let aged = f.cache_rows().await[0].value("cachedDate").cloned();

    actions::update(
        &f.instance,
        "person",
        vec![Record::new()
            .with_value("id", pk)
            .with_value("firstName", "Timothy")
            .with_value("status", 2)],
        &LoadTransaction::Unsupported,
    )
    .await
    .unwrap();

    let found = f.lookup(TIM).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value("firstName"), Some(&Value::from("Timothy")));
    assert!(found[0].value("cachedDate").is_none());

    let rows = f.cache_rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("firstName"), Some(&Value::from("Tim")));
    assert_eq!(rows[0].value("cachedDate").cloned(), aged);
}

#[tokio::test]
async fn test_numeric_key_lookups_match_across_value_types() {
    let backend = Arc::new(MemoryBackend::new("memory"));
    let badge = TableMetaData::new("badge", "memory")
        .with_field("badgeNo", FieldType::Integer)
        .with_field("holder", FieldType::String)
        .with_unique_key(UniqueKey::new(["badgeNo"]));
    let badge_cache = TableMetaData::new("badgeCache", "memory")
        .with_field("badgeNo", FieldType::Integer)
        .with_field("holder", FieldType::String)
        .with_field("cachedDate", FieldType::DateTime)
        .with_unique_key(UniqueKey::new(["badgeNo"]))
        .with_cache_of(CacheOf {
            source_table: "badge".to_string(),
            expiration_seconds: 60,
            cached_date_field: "cachedDate".to_string(),
            use_cases: vec![CacheUseCase {
                cache_unique_key: UniqueKey::new(["badgeNo"]),
                source_unique_key: UniqueKey::new(["badgeNo"]),
                cache_source_misses: false,
                copy_source_primary_key: false,
                exclude_records_matching: Vec::new(),
            }],
        });
    let instance = QqqInstance::new()
        .with_backend("memory", backend.clone())
        .with_table(badge)
        .with_table(badge_cache);
    instance.validate().unwrap();

    actions::insert(
        &instance,
        "badge",
        vec![Record::new().with_value("badgeNo", 7).with_value("holder", "Tim")],
        &LoadTransaction::Unsupported,
    )
    .await
    .unwrap();
    backend.reset_statistics();

    let by_integer = QueryFilter::new().with_criteria(FilterCriteria::equals("badgeNo", 7));
    let first = actions::query_records(&instance, "badgeCache", by_integer).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(backend.statistics("badge").queries, 1);

    let by_decimal =
        QueryFilter::new().with_criteria(FilterCriteria::equals("badgeNo", Value::Decimal(7.0)));
    let second = actions::query_records(&instance, "badgeCache", by_decimal).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(backend.statistics("badge").queries, 1);

    let mixed = QueryFilter::new().with_criteria(FilterCriteria::in_list(
        "badgeNo",
        [Value::from(7), Value::Decimal(7.0), Value::from("7")],
    ));
    let third = actions::query_records(&instance, "badgeCache", mixed).await.unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(backend.statistics("badge").queries, 1);

    let found = actions::get(
        &instance,
        "badgeCache",
        &GetInput::by_unique_key([("badgeNo", Value::Decimal(7.0))]),
    )
    .await
    .unwrap();
    assert_eq!(found.unwrap().value("holder"), Some(&Value::from("Tim")));
    assert_eq!(backend.statistics("badge").queries, 1);
    assert_eq!(backend.rows("badgeCache").await.len(), 1);
}
