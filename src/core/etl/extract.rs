//! Built-in extract step: query the source table

use crate::adapters::backend::{QueryInput, QueryOutput};
use crate::core::actions;
use crate::core::etl::state::values;
use crate::core::etl::steps::{ExtractStep, StepContext};
use crate::core::pipe::RecordPipe;
use crate::domain::filter::QueryFilter;
use crate::domain::{QqqError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Streams the source table's records matching the process filter
///
/// The filter is taken from, in order: the `queryFilterJson` value, the caller's
/// [`ProcessCallback`](crate::core::etl::ProcessCallback), the
/// `defaultQueryFilter` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendQueryExtract;

impl BackendQueryExtract {
    fn query_filter(ctx: &StepContext) -> Result<QueryFilter> {
        if let Some(json) = ctx.values().get_str(values::QUERY_FILTER_JSON) {
            return QueryFilter::from_json_str(json);
        }

        if let Some(filter) = ctx.callback().and_then(|cb| cb.query_filter()) {
            filter.validate()?;
            return Ok(filter);
        }

        if let Some(filter) = ctx.values().get_json::<QueryFilter>(values::DEFAULT_QUERY_FILTER)? {
            filter.validate()?;
            return Ok(filter);
        }

        Err(QqqError::Configuration(
            "Could not find query filter for Extract step".to_string(),
        ))
    }
}

#[async_trait]
impl ExtractStep for BackendQueryExtract {
    async fn do_count(&self, ctx: &StepContext) -> Result<Option<usize>> {
        let filter = Self::query_filter(ctx)?;
        let table = ctx.source_table()?;

        let count = actions::count(ctx.instance(), table, &filter).await?;
        // ordering and paging are not applied by count
        let count = count.saturating_sub(filter.skip.unwrap_or(0));
        Ok(Some(filter.limit.map_or(count, |limit| count.min(limit))))
    }

    async fn run(&self, ctx: &StepContext, pipe: Arc<RecordPipe>, limit: Option<usize>) -> Result<()> {
        let mut filter = Self::query_filter(ctx)?;
        if let Some(limit) = limit {
            filter.limit = Some(filter.limit.map_or(limit, |existing| existing.min(limit)));
        }
        let table = ctx.source_table()?;

        tracing::debug!(table, limit = ?filter.limit, "Extracting records");

        let mut output = QueryOutput::pipe(pipe);
        actions::query(ctx.instance(), table, &QueryInput::new(filter), &mut output).await?;

        tracing::debug!(table, count = output.count(), "Extract finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProcessConfig;
    use crate::core::etl::state::ProcessValues;
    use crate::core::etl::steps::ProcessCallback;
    use crate::core::instance::QqqInstance;
    use crate::domain::filter::FilterCriteria;
    use crate::domain::record::Value;

    struct FixedFilter(QueryFilter);

    impl ProcessCallback for FixedFilter {
        fn query_filter(&self) -> Option<QueryFilter> {
            Some(self.0.clone())
        }
    }

    fn context(values: ProcessValues, callback: Option<Arc<dyn ProcessCallback>>) -> StepContext {
        StepContext::new(
            Arc::new(QqqInstance::new()),
            Arc::new(ProcessConfig::new("p", "person", "person")),
            values,
            callback,
        )
    }

    #[test]
    fn test_filter_priority() {
        let callback: Arc<dyn ProcessCallback> = Arc::new(FixedFilter(
            QueryFilter::new().with_criteria(FilterCriteria::equals("firstName", "Tim")),
        ));

        let mut values = ProcessValues::new();
        values.set(
            values::DEFAULT_QUERY_FILTER,
            serde_json::json!({"criteria": [{"fieldName": "firstName", "operator": "EQUALS", "values": ["Darin"]}]}),
        );
        let from_default = BackendQueryExtract::query_filter(&context(values.clone(), None)).unwrap();
        assert_eq!(from_default.criteria[0].values[0], Value::from("Darin"));

        let from_callback =
            BackendQueryExtract::query_filter(&context(values.clone(), Some(callback.clone()))).unwrap();
        assert_eq!(from_callback.criteria[0].values[0], Value::from("Tim"));

        values.set(
            values::QUERY_FILTER_JSON,
            r#"{"criteria": [{"fieldName": "firstName", "operator": "EQUALS", "values": ["James"]}]}"#,
        );
        let from_json = BackendQueryExtract::query_filter(&context(values, Some(callback))).unwrap();
        assert_eq!(from_json.criteria[0].values[0], Value::from("James"));
    }

    #[test]
    fn test_no_filter_is_a_configuration_error() {
        let err = BackendQueryExtract::query_filter(&context(ProcessValues::new(), None)).unwrap_err();
        assert!(matches!(err, QqqError::Configuration(_)));
    }
}
