//! Integration tests for streamed ETL processes: preview, full validation and
//! transactional execute

use async_trait::async_trait;
use qqq::adapters::backend::LoadTransaction;
use qqq::adapters::memory::MemoryBackend;
use qqq::config::{EtlConfig, ProcessConfig};
use qqq::core::actions;
use qqq::core::etl::{
    values, BackendQueryExtract, ExtractStep, LoadMode, LoadStep, ProcessSummary, Status,
    StepContext, StepName, StepRegistry, StreamedEtlProcess, TableLoad, TransformStep,
};
use qqq::core::pipe::RecordPipe;
use qqq::core::QqqInstance;
use qqq::domain::{
    FieldMetaData, FieldType, PossibleValue, QqqError, QueryFilter, Record, Result, TableMetaData,
    UniqueKey, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SOURCE_ROWS: usize = 25;

fn person_table(name: &str) -> TableMetaData {
    TableMetaData::new(name, "memory")
        .with_field("firstName", FieldType::String)
        .with_field("email", FieldType::String)
        .with_field_meta(FieldMetaData {
            possible_values: vec![
                PossibleValue {
                    id: Value::from(1),
                    label: "Active".to_string(),
                },
                PossibleValue {
                    id: Value::from(2),
                    label: "Inactive".to_string(),
                },
            ],
            ..FieldMetaData::new("status", FieldType::Integer)
        })
        .with_unique_key(UniqueKey::new(["email"]))
}

fn copy_process() -> ProcessConfig {
    let mut process = ProcessConfig::new("copyPeople", "person", "personCopy");
    process.default_query_filter = Some(QueryFilter::new().with_order_by("id", true));
    process
}

async fn instance_with(processes: Vec<ProcessConfig>) -> (Arc<MemoryBackend>, Arc<QqqInstance>) {
    let backend = Arc::new(MemoryBackend::new("memory"));

    let mut instance = QqqInstance::new()
        .with_backend("memory", backend.clone())
        .with_table(person_table("person"))
        .with_table(person_table("personCopy"))
        .with_table(
            TableMetaData::new("contact", "memory")
                .with_field("givenName", FieldType::String)
                .with_field("emailAddress", FieldType::String),
        )
        .with_etl_config(EtlConfig {
            page_size: 10,
            pipe_capacity: 8,
            max_poll_interval_ms: 5,
            ..EtlConfig::default()
        });
    for process in processes {
        instance = instance.with_process(process);
    }
    instance.validate().unwrap();

    let people: Vec<Record> = (1..=SOURCE_ROWS as i64)
        .map(|i| {
            Record::new()
                .with_value("firstName", format!("Person {i}"))
                .with_value("email", format!("p{i}@example.com"))
                .with_value("status", i % 2 + 1)
        })
        .collect();
    let inserted = actions::insert(&instance, "person", people, &LoadTransaction::Unsupported)
        .await
        .unwrap();
    assert!(inserted.iter().all(|r| !r.has_errors()));
    backend.reset_statistics();

    (backend, Arc::new(instance))
}

fn process_summary(values: &qqq::core::etl::ProcessValues, name: &str) -> ProcessSummary {
    values.get_json(name).unwrap().unwrap()
}

#[tokio::test]
async fn test_preview_then_execute() {
    let (backend, instance) = instance_with(vec![copy_process()]).await;
    let process = StreamedEtlProcess::new(instance, "copyPeople", &StepRegistry::default()).unwrap();
    let mut state = process.new_state();

    process.run(&mut state).await.unwrap();
    assert_eq!(state.current_step(), Some(StepName::Review));
    assert_eq!(state.records().len(), 20);
    assert_eq!(state.values().get_usize(values::RECORD_COUNT), Some(SOURCE_ROWS));
    assert_eq!(state.records()[0].display_value("status"), Some("Inactive"));
    assert!(backend.rows("personCopy").await.is_empty());

    process.resume(&mut state).await.unwrap();
    assert_eq!(state.current_step(), Some(StepName::Result));
    assert_eq!(state.values().get_usize(values::RECORD_COUNT), Some(SOURCE_ROWS));
    assert_eq!(state.records().len(), 20);

    let summary = process_summary(state.values(), values::PROCESS_SUMMARY);
    assert_eq!(summary.records_processed, SOURCE_ROWS);
    assert_eq!(summary.count(Status::Ok), SOURCE_ROWS);
    assert!(summary.is_successful());

    let stats = backend.transaction_statistics();
    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.committed(), 1);
    assert_eq!(stats.rolled_back(), 0);
    assert_eq!(stats.closed(), 1);
    assert_eq!(backend.rows("personCopy").await.len(), SOURCE_ROWS);

    process.resume(&mut state).await.unwrap();
    assert!(state.is_complete());
}

#[tokio::test]
async fn test_per_record_errors_do_not_abort_execute() {
    let (backend, instance) = instance_with(vec![copy_process()]).await;
    actions::insert(
        &instance,
        "personCopy",
        vec![Record::new().with_value("email", "p3@example.com")],
        &LoadTransaction::Unsupported,
    )
    .await
    .unwrap();

    let process = StreamedEtlProcess::new(instance, "copyPeople", &StepRegistry::default()).unwrap();
    let mut state = process.new_state();
    process.run(&mut state).await.unwrap();
    process.resume(&mut state).await.unwrap();

    let summary = process_summary(state.values(), values::PROCESS_SUMMARY);
    assert_eq!(summary.records_processed, SOURCE_ROWS);
    assert_eq!(summary.count(Status::Ok), SOURCE_ROWS - 1);
    assert_eq!(summary.count(Status::Error), 1);
    assert!(!summary.is_successful());

    assert_eq!(backend.transaction_statistics().committed(), 1);
    assert_eq!(backend.rows("personCopy").await.len(), SOURCE_ROWS);
}

struct FailingLoad {
    inner: TableLoad,
    calls: AtomicUsize,
}

#[async_trait]
impl LoadStep for FailingLoad {
    async fn open_transaction(&self, ctx: &StepContext) -> Result<LoadTransaction> {
        self.inner.open_transaction(ctx).await
    }

    async fn load(
        &self,
        ctx: &StepContext,
        records: Vec<Record>,
        transaction: &LoadTransaction,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(QqqError::Process("destination rejected page 2".to_string()));
        }
        self.inner.load(ctx, records, transaction, summary).await
    }
}

#[tokio::test]
async fn test_execute_failure_rolls_back_once() {
    let mut definition = copy_process();
    definition.load_code = "failing".to_string();
    let (backend, instance) = instance_with(vec![definition]).await;

    let registry = StepRegistry::default().with_load("failing", || {
        Arc::new(FailingLoad {
            inner: TableLoad::new(LoadMode::Insert),
            calls: AtomicUsize::new(0),
        })
    });
    let process = StreamedEtlProcess::new(instance, "copyPeople", &registry).unwrap();
    let mut state = process.new_state();
    process.run(&mut state).await.unwrap();

    let err = process.resume(&mut state).await.unwrap_err();
    assert!(matches!(err, QqqError::Process(ref msg) if msg == "destination rejected page 2"));
    assert_eq!(state.current_step(), Some(StepName::Execute));

    let stats = backend.transaction_statistics();
    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.rolled_back(), 1);
    assert_eq!(stats.committed(), 0);
    assert_eq!(stats.closed(), 1);
    assert!(backend.rows("personCopy").await.is_empty());
}

#[derive(Default)]
struct Calls {
    counts: AtomicUsize,
    runs: AtomicUsize,
}

struct CountingExtract(Arc<Calls>);

#[async_trait]
impl ExtractStep for CountingExtract {
    async fn do_count(&self, ctx: &StepContext) -> Result<Option<usize>> {
        self.0.counts.fetch_add(1, Ordering::SeqCst);
        BackendQueryExtract.do_count(ctx).await
    }

    async fn run(&self, ctx: &StepContext, pipe: Arc<RecordPipe>, limit: Option<usize>) -> Result<()> {
        self.0.runs.fetch_add(1, Ordering::SeqCst);
        BackendQueryExtract.run(ctx, pipe, limit).await
    }
}

#[tokio::test]
async fn test_full_validation_skips_preview() {
    let mut definition = copy_process();
    definition.extract_code = "counting".to_string();
    definition.supports_full_validation = true;
    let (_backend, instance) = instance_with(vec![definition]).await;

    let calls = Arc::new(Calls::default());
    let registry = {
        let calls = calls.clone();
        StepRegistry::default().with_extract("counting", move || Arc::new(CountingExtract(calls.clone())))
    };
    let process = StreamedEtlProcess::new(instance, "copyPeople", &registry).unwrap();
    let mut state = process.new_state();
    state.values_mut().set(values::DO_FULL_VALIDATION, true);

    process.run(&mut state).await.unwrap();

    assert_eq!(
        state.steps(),
        &[
            StepName::Preview,
            StepName::Validate,
            StepName::Review,
            StepName::Execute,
            StepName::Result
        ]
    );
    assert_eq!(state.current_step(), Some(StepName::Review));
    assert_eq!(calls.counts.load(Ordering::SeqCst), 0);
    assert_eq!(calls.runs.load(Ordering::SeqCst), 1);

    assert_eq!(state.values().get_usize(values::RECORD_COUNT), Some(SOURCE_ROWS));
    assert_eq!(state.records().len(), 20);
    let validation = process_summary(state.values(), values::VALIDATION_SUMMARY);
    assert_eq!(validation.count(Status::Ok), SOURCE_ROWS);

    process.resume(&mut state).await.unwrap();
    assert_eq!(state.current_step(), Some(StepName::Result));
    assert_eq!(calls.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_full_validation_not_supported_runs_default_steps() {
    let (_backend, instance) = instance_with(vec![copy_process()]).await;
    let process = StreamedEtlProcess::new(instance, "copyPeople", &StepRegistry::default()).unwrap();
    let mut state = process.new_state();
    state.values_mut().set(values::DO_FULL_VALIDATION, true);

    process.run(&mut state).await.unwrap();
    assert_eq!(state.steps(), &StepName::DEFAULT_STEPS);
    assert_eq!(state.records().len(), 20);
    assert!(state.values().get(values::VALIDATION_SUMMARY).is_none());
}

struct BareTransform;

#[async_trait]
impl TransformStep for BareTransform {
    async fn transform(
        &self,
        _ctx: &StepContext,
        records: Vec<Record>,
        _summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>> {
        Ok(records)
    }
}

#[tokio::test]
async fn test_full_validation_requires_summary_provider() {
    let mut definition = copy_process();
    definition.transform_code = "bare".to_string();
    definition.supports_full_validation = true;
    let (backend, instance) = instance_with(vec![definition]).await;

    let registry = StepRegistry::default().with_transform("bare", || Arc::new(BareTransform));
    let process = StreamedEtlProcess::new(instance, "copyPeople", &registry).unwrap();
    let mut state = process.new_state();
    state.values_mut().set(values::DO_FULL_VALIDATION, true);

    let err = process.run(&mut state).await.unwrap_err();
    assert!(matches!(err, QqqError::Configuration(_)));
    assert_eq!(backend.statistics("person").queries, 0);
}

#[tokio::test]
async fn test_missing_filter_is_fatal() {
    let mut definition = copy_process();
    definition.default_query_filter = None;
    let (_backend, instance) = instance_with(vec![definition]).await;

    let process = StreamedEtlProcess::new(instance, "copyPeople", &StepRegistry::default()).unwrap();
    let mut state = process.new_state();

    let err = process.run(&mut state).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration error: Could not find query filter for Extract step"
    );
}

#[tokio::test]
async fn test_caller_filter_and_field_mapping() {
    let mut definition = ProcessConfig::new("toContacts", "person", "contact");
    definition.transform_code = "field_mapping".to_string();
    definition.load_code = "insert_or_update".to_string();
    definition.default_query_filter = Some(QueryFilter::new());
    definition.field_mappings.insert("firstName".to_string(), "givenName".to_string());
    definition.field_mappings.insert("email".to_string(), "emailAddress".to_string());
    let (backend, instance) = instance_with(vec![definition]).await;

    let process = StreamedEtlProcess::new(instance, "toContacts", &StepRegistry::default()).unwrap();
    let mut state = process.new_state();
    state.values_mut().set(
        values::QUERY_FILTER_JSON,
        r#"{"criteria": [{"fieldName": "status", "operator": "EQUALS", "values": [1]}]}"#,
    );

    process.run(&mut state).await.unwrap();
    assert_eq!(state.values().get_usize(values::RECORD_COUNT), Some(12));
    process.resume(&mut state).await.unwrap();

    let contacts = backend.rows("contact").await;
    assert_eq!(contacts.len(), 12);
    assert!(contacts.iter().all(|c| c.value("givenName").is_some()));
    assert!(contacts.iter().all(|c| c.value("firstName").is_none()));
}
