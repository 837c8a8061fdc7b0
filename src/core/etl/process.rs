//! Streamed ETL process runner
//!
//! Walks a [`ProcessState`] through its step list. Preview, validate and execute
//! run on the backend; review and result are where the runner stops and hands
//! control back to the caller.

use crate::adapters::backend::LoadTransaction;
use crate::config::schema::ProcessConfig;
use crate::core::etl::state::{values, ProcessState, StepName};
use crate::core::etl::steps::{
    ExtractStep, LoadStep, ProcessCallback, ResolvedSteps, StepContext, StepRegistry, TransformStep,
};
use crate::core::etl::summary::ProcessSummary;
use crate::core::instance::QqqInstance;
use crate::core::pipe::{AsyncRecordPipeLoop, RecordConsumer, RecordPipe};
use crate::domain::record::Record;
use crate::domain::{QqqError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A process definition bound to an instance and its resolved steps
///
/// # Examples
///
/// ```no_run
/// use qqq::core::etl::{StepRegistry, StreamedEtlProcess};
/// use qqq::core::QqqInstance;
/// use std::sync::Arc;
///
/// # async fn example(instance: Arc<QqqInstance>) -> qqq::domain::Result<()> {
/// let process = StreamedEtlProcess::new(instance, "copyPeople", &StepRegistry::default())?;
/// let mut state = process.new_state();
///
/// process.run(&mut state).await?; // stops at review
/// println!("{} preview records", state.records().len());
///
/// process.resume(&mut state).await?; // execute, stops at result
/// # Ok(())
/// # }
/// ```
pub struct StreamedEtlProcess {
    instance: Arc<QqqInstance>,
    definition: Arc<ProcessConfig>,
    steps: ResolvedSteps,
    callback: Option<Arc<dyn ProcessCallback>>,
    pipe_loop: AsyncRecordPipeLoop,
}

impl StreamedEtlProcess {
    /// Bind a process definition, resolving its step codes
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown process or step code
    pub fn new(instance: Arc<QqqInstance>, process_name: &str, registry: &StepRegistry) -> Result<Self> {
        let definition = Arc::new(instance.process(process_name)?.clone());
        let steps = registry.resolve(&definition)?;
        let pipe_loop = AsyncRecordPipeLoop::new().with_max_sleep(Duration::from_millis(
            instance.etl_config().max_poll_interval_ms,
        ));

        Ok(Self {
            instance,
            definition,
            steps,
            callback: None,
            pipe_loop,
        })
    }

    /// Builder: attach caller hooks
    pub fn with_callback(mut self, callback: Arc<dyn ProcessCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Fresh state for a run of this process
    pub fn new_state(&self) -> ProcessState {
        ProcessState::new(&self.definition)
    }

    /// Run backend steps from the start of the step list until a frontend step
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a step; the state stays on that step
    pub async fn run(&self, state: &mut ProcessState) -> Result<()> {
        if state.current_step().is_some() {
            return Err(QqqError::Process(format!(
                "Process run {} has already started",
                state.run_id()
            )));
        }
        self.run_until_frontend(state).await
    }

    /// Continue a run that stopped at a frontend step
    ///
    /// # Errors
    ///
    /// Returns a process error if the run is not waiting at a frontend step, or
    /// the first error raised by a step
    pub async fn resume(&self, state: &mut ProcessState) -> Result<()> {
        match state.current_step() {
            Some(step) if step.is_frontend() => self.run_until_frontend(state).await,
            other => Err(QqqError::Process(format!(
                "Process run {} is not waiting for the caller (current step: {})",
                state.run_id(),
                other.map_or("none", StepName::as_str)
            ))),
        }
    }

    async fn run_until_frontend(&self, state: &mut ProcessState) -> Result<()> {
        while let Some(step) = state.advance() {
            if step.is_frontend() {
                tracing::info!(
                    run_id = %state.run_id(),
                    process = %self.definition.name,
                    step = %step,
                    "Waiting for caller"
                );
                return Ok(());
            }

            tracing::info!(
                run_id = %state.run_id(),
                process = %self.definition.name,
                step = %step,
                "Running step"
            );
            match step {
                StepName::Preview => self.preview(state).await?,
                StepName::Validate => self.validate(state).await?,
                StepName::Execute => self.execute(state).await?,
                StepName::Review | StepName::Result => {}
            }
        }
        Ok(())
    }

    fn context(&self, state: &ProcessState) -> StepContext {
        StepContext::new(
            self.instance.clone(),
            self.definition.clone(),
            state.values().clone(),
            self.callback.clone(),
        )
    }

    fn new_pipe(&self) -> Arc<RecordPipe> {
        Arc::new(RecordPipe::with_capacity(Some(self.instance.etl_config().pipe_capacity)))
    }

    fn full_validation_requested(state: &ProcessState) -> bool {
        state.values().get_bool(values::SUPPORTS_FULL_VALIDATION)
            && state.values().get_bool(values::DO_FULL_VALIDATION)
    }

    fn job_name(&self, state: &ProcessState, phase: StepName) -> String {
        format!("{}:{}:{}", self.definition.name, phase, state.run_id())
    }

    /// Extract and transform the first records, without loading
    async fn preview(&self, state: &mut ProcessState) -> Result<()> {
        if Self::full_validation_requested(state) {
            tracing::debug!(run_id = %state.run_id(), "Skipping preview for full validation");
            return state.move_review_after(StepName::Validate);
        }

        let ctx = self.context(state);
        let extract = (self.steps.extract)();
        let transform = (self.steps.transform)();
        let limit = self.instance.etl_config().preview_limit;

        let record_count = extract.do_count(&ctx).await?;

        let pipe = self.new_pipe();
        let mut consumer = TransformConsumer::new(&ctx, transform.as_ref(), limit);
        let consumed = self
            .pipe_loop
            .run(
                &self.job_name(state, StepName::Preview),
                Some(limit),
                pipe.clone(),
                extract_producer(extract, ctx.clone(), pipe, Some(limit)),
                &mut consumer,
            )
            .await?;

        let mut records = consumer.samples;
        self.annotate_display_values(&mut records);

        state
            .values_mut()
            .set(values::RECORD_COUNT, record_count.unwrap_or(consumed));
        state.set_records(records);
        Ok(())
    }

    /// Extract and transform everything, without loading, for its summary
    async fn validate(&self, state: &mut ProcessState) -> Result<()> {
        if !Self::full_validation_requested(state) {
            tracing::debug!(run_id = %state.run_id(), "Full validation not requested, skipping");
            return Ok(());
        }

        let ctx = self.context(state);
        let transform = (self.steps.transform)();
        let Some(provider) = transform.summary_provider() else {
            return Err(QqqError::Configuration(format!(
                "Transform step '{}' of process '{}' does not provide a process summary, which full validation requires",
                self.definition.transform_code, self.definition.name
            )));
        };

        state.move_review_after(StepName::Validate)?;

        let start = Instant::now();
        let pipe = self.new_pipe();
        let mut consumer =
            TransformConsumer::new(&ctx, transform.as_ref(), self.instance.etl_config().preview_limit);
        let consumed = self
            .pipe_loop
            .run(
                &self.job_name(state, StepName::Validate),
                None,
                pipe.clone(),
                extract_producer((self.steps.extract)(), ctx.clone(), pipe, None),
                &mut consumer,
            )
            .await?;

        let summary = provider
            .process_summary(&consumer.summary)
            .with_duration(start.elapsed());
        summary.log_summary(StepName::Validate.as_str());

        state.values_mut().set(values::RECORD_COUNT, consumed);
        state
            .values_mut()
            .set(values::VALIDATION_SUMMARY, serde_json::to_value(&summary)?);
        state.set_records(consumer.samples);
        Ok(())
    }

    /// Extract, transform and load everything inside one transaction
    async fn execute(&self, state: &mut ProcessState) -> Result<()> {
        let ctx = self.context(state);
        let load = (self.steps.load)();
        let transaction = load.open_transaction(&ctx).await?;

        let start = Instant::now();
        let job_name = self.job_name(state, StepName::Execute);
        let result = self
            .load_all(&ctx, &job_name, load.as_ref(), &transaction)
            .await;

        let outcome = match result {
            Ok(loaded) => match transaction.commit().await {
                Ok(()) => Ok(loaded),
                Err(e) => {
                    crate::log_error_with_context!(&e, "Commit failed, rolling back");
                    rollback_quietly(&transaction).await;
                    Err(e)
                }
            },
            Err(e) => {
                crate::log_error_with_context!(&e, "Execute failed, rolling back");
                rollback_quietly(&transaction).await;
                Err(e)
            }
        };

        let closed = transaction.close().await;
        let (consumed, samples, summary) = outcome?;
        closed?;

        let summary = summary.with_duration(start.elapsed());
        summary.log_summary(StepName::Execute.as_str());

        state.values_mut().set(values::RECORD_COUNT, consumed);
        state
            .values_mut()
            .set(values::PROCESS_SUMMARY, serde_json::to_value(&summary)?);
        state.set_records(samples);
        Ok(())
    }

    async fn load_all(
        &self,
        ctx: &StepContext,
        job_name: &str,
        load: &dyn LoadStep,
        transaction: &LoadTransaction,
    ) -> Result<(usize, Vec<Record>, ProcessSummary)> {
        let transform = (self.steps.transform)();
        let etl = self.instance.etl_config();

        let mut consumer = LoadConsumer {
            ctx,
            transform: transform.as_ref(),
            load,
            transaction,
            page_size: etl.page_size.max(1),
            sample_limit: etl.preview_limit,
            transform_summary: ProcessSummary::new(),
            summary: ProcessSummary::new(),
            samples: Vec::new(),
        };

        let pipe = self.new_pipe();
        let consumed = self
            .pipe_loop
            .run(
                job_name,
                None,
                pipe.clone(),
                extract_producer((self.steps.extract)(), ctx.clone(), pipe, None),
                &mut consumer,
            )
            .await?;

        tracing::debug!(
            transformed = consumer.transform_summary.records_processed,
            loaded = consumer.summary.records_processed,
            "Execute pipe loop finished"
        );
        Ok((consumed, consumer.samples, consumer.summary))
    }

    /// Attach possible-value labels for display
    fn annotate_display_values(&self, records: &mut [Record]) {
        let Ok(table) = self.instance.table(&self.definition.destination_table) else {
            return;
        };

        for record in records.iter_mut() {
            let labels: Vec<(String, String)> = table
                .fields
                .iter()
                .filter_map(|field| {
                    let value = record.value(&field.name)?;
                    let label = field.possible_value_label(value)?;
                    Some((field.name.clone(), label.to_string()))
                })
                .collect();
            for (field, label) in labels {
                record.set_display_value(field, label);
            }
        }
    }
}

fn extract_producer(
    extract: Arc<dyn ExtractStep>,
    ctx: StepContext,
    pipe: Arc<RecordPipe>,
    limit: Option<usize>,
) -> impl std::future::Future<Output = Result<()>> + Send + 'static {
    async move { extract.run(&ctx, pipe, limit).await }
}

async fn rollback_quietly(transaction: &LoadTransaction) {
    if let Err(e) = transaction.rollback().await {
        crate::log_error_with_context!(&e, "Rollback failed");
    }
}

/// Transforms drained records, keeping the first ones as samples
struct TransformConsumer<'a> {
    ctx: &'a StepContext,
    transform: &'a dyn TransformStep,
    sample_limit: usize,
    summary: ProcessSummary,
    samples: Vec<Record>,
}

impl<'a> TransformConsumer<'a> {
    fn new(ctx: &'a StepContext, transform: &'a dyn TransformStep, sample_limit: usize) -> Self {
        Self {
            ctx,
            transform,
            sample_limit,
            summary: ProcessSummary::new(),
            samples: Vec::new(),
        }
    }
}

#[async_trait]
impl RecordConsumer for TransformConsumer<'_> {
    async fn consume(&mut self, records: Vec<Record>) -> Result<usize> {
        let count = records.len();
        let output = self
            .transform
            .transform(self.ctx, records, &mut self.summary)
            .await?;
        keep_samples(&mut self.samples, output, self.sample_limit);
        Ok(count)
    }
}

/// Transforms and loads drained records page by page
struct LoadConsumer<'a> {
    ctx: &'a StepContext,
    transform: &'a dyn TransformStep,
    load: &'a dyn LoadStep,
    transaction: &'a LoadTransaction,
    page_size: usize,
    sample_limit: usize,
    transform_summary: ProcessSummary,
    summary: ProcessSummary,
    samples: Vec<Record>,
}

#[async_trait]
impl RecordConsumer for LoadConsumer<'_> {
    async fn consume(&mut self, records: Vec<Record>) -> Result<usize> {
        let count = records.len();
        let mut records = records.into_iter().peekable();

        while records.peek().is_some() {
            let page: Vec<Record> = records.by_ref().take(self.page_size).collect();
            let transformed = self
                .transform
                .transform(self.ctx, page, &mut self.transform_summary)
                .await?;
            let loaded = self
                .load
                .load(self.ctx, transformed, self.transaction, &mut self.summary)
                .await?;
            keep_samples(&mut self.samples, loaded, self.sample_limit);
        }
        Ok(count)
    }
}

fn keep_samples(samples: &mut Vec<Record>, records: Vec<Record>, limit: usize) {
    let room = limit.saturating_sub(samples.len());
    samples.extend(records.into_iter().take(room));
}
