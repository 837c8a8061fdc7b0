//! Built-in transform steps

use crate::core::etl::steps::{ProcessSummaryProvider, StepContext, TransformStep};
use crate::core::etl::summary::{ProcessSummary, Status};
use crate::domain::record::Record;
use crate::domain::Result;
use async_trait::async_trait;

const OK_MESSAGE: &str = "records will be processed";

/// Passes records through unchanged, counting each one
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransform;

#[async_trait]
impl TransformStep for NoopTransform {
    async fn transform(
        &self,
        ctx: &StepContext,
        records: Vec<Record>,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>> {
        let pk_field = source_primary_key_field(ctx);
        for record in &records {
            summary.add_record_outcome(record, &pk_field, OK_MESSAGE);
        }
        Ok(records)
    }

    fn summary_provider(&self) -> Option<&dyn ProcessSummaryProvider> {
        Some(self)
    }
}

impl ProcessSummaryProvider for NoopTransform {
    fn process_summary(&self, accumulated: &ProcessSummary) -> ProcessSummary {
        accumulated.clone()
    }
}

/// Renames fields according to the process's field mappings
///
/// Output records hold only the mapped fields. A record missing a mapped source
/// field gets a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMappingTransform;

#[async_trait]
impl TransformStep for FieldMappingTransform {
    async fn transform(
        &self,
        ctx: &StepContext,
        records: Vec<Record>,
        summary: &mut ProcessSummary,
    ) -> Result<Vec<Record>> {
        let mappings = &ctx.definition().field_mappings;
        let pk_field = source_primary_key_field(ctx);

        let mut output = Vec::with_capacity(records.len());
        for record in records {
            let mut mapped = Record::new();
            for (from, to) in mappings {
                match record.value(from) {
                    Some(value) if !value.is_null() => mapped.set_value(to.clone(), value.clone()),
                    _ => mapped.add_warning(format!("No value for field {from}")),
                }
            }

            summary.records_processed += 1;
            let pk = record.value(&pk_field);
            for warning in mapped.warnings() {
                summary.add_record(Status::Warning, &warning.message, pk);
            }
            summary.add_record(Status::Ok, OK_MESSAGE, pk);

            output.push(mapped);
        }
        Ok(output)
    }

    fn summary_provider(&self) -> Option<&dyn ProcessSummaryProvider> {
        Some(self)
    }
}

impl ProcessSummaryProvider for FieldMappingTransform {
    fn process_summary(&self, accumulated: &ProcessSummary) -> ProcessSummary {
        let mut summary = accumulated.clone();
        let warned = summary.count(Status::Warning);
        if warned > 0 {
            summary.add(Status::Info, "records had unmapped values", warned);
        }
        summary
    }
}

fn source_primary_key_field(ctx: &StepContext) -> String {
    ctx.source_table()
        .and_then(|name| ctx.instance().table(name))
        .map(|table| table.primary_key_field.clone())
        .unwrap_or_else(|_| "id".to_string())
}
