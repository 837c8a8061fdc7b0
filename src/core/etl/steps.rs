//! Extract, transform and load step abstractions
//!
//! Steps are looked up by code in a [`StepRegistry`] once per process definition.
//! Each phase of a run creates fresh step instances from the resolved factories.

use crate::adapters::backend::LoadTransaction;
use crate::config::schema::ProcessConfig;
use crate::core::etl::state::{values, ProcessValues};
use crate::core::etl::summary::ProcessSummary;
use crate::core::etl::{extract, load, transform};
use crate::core::instance::QqqInstance;
use crate::core::pipe::RecordPipe;
use crate::domain::filter::QueryFilter;
use crate::domain::record::Record;
use crate::domain::{QqqError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Caller-side hooks a process can consult while running
pub trait ProcessCallback: Send + Sync {
    /// Filter chosen interactively by the caller, if any
    fn query_filter(&self) -> Option<QueryFilter>;
}

/// Everything a step can see while it runs
#[derive(Clone)]
pub struct StepContext {
    instance: Arc<QqqInstance>,
    definition: Arc<ProcessConfig>,
    values: ProcessValues,
    callback: Option<Arc<dyn ProcessCallback>>,
}

impl StepContext {
    /// Create a context
    pub fn new(
        instance: Arc<QqqInstance>,
        definition: Arc<ProcessConfig>,
        values: ProcessValues,
        callback: Option<Arc<dyn ProcessCallback>>,
    ) -> Self {
        Self {
            instance,
            definition,
            values,
            callback,
        }
    }

    /// Instance the process runs against
    pub fn instance(&self) -> &QqqInstance {
        &self.instance
    }

    /// Process definition
    pub fn definition(&self) -> &ProcessConfig {
        &self.definition
    }

    /// Process values at the start of the phase
    pub fn values(&self) -> &ProcessValues {
        &self.values
    }

    /// Caller hooks
    pub fn callback(&self) -> Option<&dyn ProcessCallback> {
        self.callback.as_deref()
    }

    /// Source table name
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the value is missing
    pub fn source_table(&self) -> Result<&str> {
        self.required_str(values::SOURCE_TABLE)
    }

    /// Destination table name
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the value is missing
    pub fn destination_table(&self) -> Result<&str> {
        self.required_str(values::DESTINATION_TABLE)
    }

    fn required_str(&self, name: &str) -> Result<&str> {
        self.values
            .get_str(name)
            .ok_or_else(|| QqqError::Configuration(format!("Missing process value {name}")))
    }
}

/// Produces the records a process works on
#[async_trait]
pub trait ExtractStep: Send + Sync {
    /// Number of records `run` would produce without a limit, if cheaply known
    async fn do_count(&self, ctx: &StepContext) -> Result<Option<usize>>;

    /// Write records into `pipe`, stopping after `limit` if given
    ///
    /// Implementations must stop when adding to the pipe fails.
    async fn run(&self, ctx: &StepContext, pipe: Arc<RecordPipe>, limit: Option<usize>) -> Result<()>;
}

/// Builds the final summary of a validation pass
pub trait ProcessSummaryProvider: Send + Sync {
    /// Summary to show for the accumulated per-page summary
    fn process_summary(&self, accumulated: &ProcessSummary) -> ProcessSummary;
}

/// Maps a page of records to a page of output records
#[async_trait]
pub trait TransformStep: Send + Sync {
    /// Transform one page, counting outcomes into `summary`
    async fn transform(
        &self,
        ctx: &StepContext,
        records: Vec<Record>,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>>;

    /// Summary capability; required by the validate phase
    fn summary_provider(&self) -> Option<&dyn ProcessSummaryProvider> {
        None
    }
}

/// Persists a page of records
#[async_trait]
pub trait LoadStep: Send + Sync {
    /// Open the transaction the whole execute phase loads through
    async fn open_transaction(&self, ctx: &StepContext) -> Result<LoadTransaction>;

    /// Persist one page, returning it with per-record errors and warnings attached
    async fn load(
        &self,
        ctx: &StepContext,
        records: Vec<Record>,
        transaction: &LoadTransaction,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>>;
}

/// Creates extract steps
pub type ExtractFactory = Arc<dyn Fn() -> Arc<dyn ExtractStep> + Send + Sync>;
/// Creates transform steps
pub type TransformFactory = Arc<dyn Fn() -> Arc<dyn TransformStep> + Send + Sync>;
/// Creates load steps
pub type LoadFactory = Arc<dyn Fn() -> Arc<dyn LoadStep> + Send + Sync>;

/// Step factories of one process definition
#[derive(Clone)]
pub struct ResolvedSteps {
    /// Extract factory
    pub extract: ExtractFactory,
    /// Transform factory
    pub transform: TransformFactory,
    /// Load factory
    pub load: LoadFactory,
}

/// Step code → factory lookup
///
/// # Examples
///
/// ```
/// use qqq::core::etl::StepRegistry;
///
/// let registry = StepRegistry::default();
/// assert!(registry.extract("backend_query").is_ok());
/// assert!(registry.load("insert_or_update").is_ok());
/// assert!(registry.transform("no_such_step").is_err());
/// ```
#[derive(Clone)]
pub struct StepRegistry {
    extract: HashMap<String, ExtractFactory>,
    transform: HashMap<String, TransformFactory>,
    load: HashMap<String, LoadFactory>,
}

impl StepRegistry {
    /// A registry with no steps
    pub fn empty() -> Self {
        Self {
            extract: HashMap::new(),
            transform: HashMap::new(),
            load: HashMap::new(),
        }
    }

    /// Builder: register an extract step
    pub fn with_extract<F>(mut self, code: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn ExtractStep> + Send + Sync + 'static,
    {
        self.extract.insert(code.into(), Arc::new(factory));
        self
    }

    /// Builder: register a transform step
    pub fn with_transform<F>(mut self, code: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn TransformStep> + Send + Sync + 'static,
    {
        self.transform.insert(code.into(), Arc::new(factory));
        self
    }

    /// Builder: register a load step
    pub fn with_load<F>(mut self, code: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn LoadStep> + Send + Sync + 'static,
    {
        self.load.insert(code.into(), Arc::new(factory));
        self
    }

    /// Extract factory for a code
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown code
    pub fn extract(&self, code: &str) -> Result<ExtractFactory> {
        lookup(&self.extract, "extract", code)
    }

    /// Transform factory for a code
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown code
    pub fn transform(&self, code: &str) -> Result<TransformFactory> {
        lookup(&self.transform, "transform", code)
    }

    /// Load factory for a code
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown code
    pub fn load(&self, code: &str) -> Result<LoadFactory> {
        lookup(&self.load, "load", code)
    }

    /// Resolve the three steps of a process definition
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first unknown code
    pub fn resolve(&self, definition: &ProcessConfig) -> Result<ResolvedSteps> {
        Ok(ResolvedSteps {
            extract: self.extract(&definition.extract_code)?,
            transform: self.transform(&definition.transform_code)?,
            load: self.load(&definition.load_code)?,
        })
    }
}

impl Default for StepRegistry {
    /// Registry with the built-in steps
    fn default() -> Self {
        Self::empty()
            .with_extract("backend_query", || Arc::new(extract::BackendQueryExtract))
            .with_transform("noop", || Arc::new(transform::NoopTransform))
            .with_transform("field_mapping", || Arc::new(transform::FieldMappingTransform))
            .with_load("insert", || Arc::new(load::TableLoad::new(load::LoadMode::Insert)))
            .with_load("update", || Arc::new(load::TableLoad::new(load::LoadMode::Update)))
            .with_load("insert_or_update", || {
                Arc::new(load::TableLoad::new(load::LoadMode::InsertOrUpdate))
            })
            .with_load("delete", || Arc::new(load::TableLoad::new(load::LoadMode::Delete)))
    }
}

fn lookup<T: Clone>(factories: &HashMap<String, T>, kind: &str, code: &str) -> Result<T> {
    factories
        .get(code)
        .cloned()
        .ok_or_else(|| QqqError::Configuration(format!("Unknown {kind} step code: {code}")))
}
