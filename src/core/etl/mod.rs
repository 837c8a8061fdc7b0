//! Streamed ETL processes
//!
//! A process copies records from a source table to a destination table through
//! three pluggable steps (extract, transform, load), looked up by code in a
//! [`StepRegistry`]. Records stream from the extract step to the others through
//! a bounded [`RecordPipe`](crate::core::pipe::RecordPipe), so memory use does not
//! grow with the size of the source.
//!
//! # Steps of a run
//!
//! | Step       | Runs on  | Does                                               |
//! |------------|----------|----------------------------------------------------|
//! | `preview`  | backend  | extract and transform the first records            |
//! | `review`   | caller   | the caller inspects the preview                    |
//! | `validate` | backend  | full extract and transform, summarized (optional)  |
//! | `execute`  | backend  | extract, transform and load in one transaction     |
//! | `result`   | caller   | the caller reads the process summary               |
//!
//! [`StreamedEtlProcess::run`] stops at `review`; [`StreamedEtlProcess::resume`]
//! continues from there.

pub mod extract;
pub mod load;
pub mod process;
pub mod state;
pub mod steps;
pub mod summary;
pub mod transform;

pub use extract::BackendQueryExtract;
pub use load::{LoadMode, TableLoad};
pub use process::StreamedEtlProcess;
pub use state::{values, ProcessState, ProcessValues, StepName};
pub use steps::{
    ExtractStep, LoadStep, ProcessCallback, ProcessSummaryProvider, StepContext, StepRegistry,
    TransformStep,
};
pub use summary::{ProcessSummary, ProcessSummaryLine, Status};
pub use transform::{FieldMappingTransform, NoopTransform};
