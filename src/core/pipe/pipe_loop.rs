//! Producer/consumer loop over a [`RecordPipe`]
//!
//! The producer (normally an extract step) runs on its own tokio task and writes
//! into the pipe; the calling task polls the pipe and hands every non-empty batch
//! to a [`RecordConsumer`]. An optional record limit stops the producer early.

use crate::core::pipe::RecordPipe;
use crate::domain::errors::QqqError;
use crate::domain::record::Record;
use crate::domain::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shortest sleep between polls
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// Default longest sleep between polls while the pipe stays empty
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_millis(100);

/// Receives the batches drained from a pipe
#[async_trait]
pub trait RecordConsumer: Send {
    /// Process one drained batch, returning how many records were consumed
    ///
    /// # Errors
    ///
    /// Any error aborts the loop: the pipe is terminated, the producer is awaited
    /// and the error is returned from [`AsyncRecordPipeLoop::run`].
    async fn consume(&mut self, records: Vec<Record>) -> Result<usize>;
}

/// Runs one producer task against a pipe and drains it on the calling task
#[derive(Debug, Clone)]
pub struct AsyncRecordPipeLoop {
    max_sleep: Duration,
}

impl AsyncRecordPipeLoop {
    /// Create a loop with the default maximum poll interval
    pub fn new() -> Self {
        Self {
            max_sleep: DEFAULT_MAX_SLEEP,
        }
    }

    /// Builder: set the maximum poll interval
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep.max(MIN_SLEEP);
        self
    }

    /// Run `producer` against `pipe`, feeding everything it produces to `consumer`.
    ///
    /// The loop ends when the producer has finished and the pipe is empty, or when
    /// the number of consumed records reaches `limit`. In the latter case the pipe
    /// is terminated and exactly one more drain is performed.
    ///
    /// # Arguments
    ///
    /// * `job_name` - Name used in log output
    /// * `limit` - Optional cap on the number of records to consume
    /// * `pipe` - The pipe shared with the producer
    /// * `producer` - Future writing into `pipe`; spawned on its own task
    /// * `consumer` - Receives each non-empty batch
    ///
    /// # Returns
    ///
    /// The total number of records consumed.
    ///
    /// # Errors
    ///
    /// Returns the producer's error (after the remaining records were drained),
    /// or the consumer's error. A [`QqqError::PipeTerminated`] raised by the
    /// producer because this loop terminated the pipe is not an error.
    pub async fn run<F>(
        &self,
        job_name: &str,
        limit: Option<usize>,
        pipe: Arc<RecordPipe>,
        producer: F,
        consumer: &mut dyn RecordConsumer,
    ) -> Result<usize>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let start = Instant::now();
        tracing::info!(job_name, limit = ?limit, "Starting record pipe loop");

        let mut producer_handle = tokio::spawn(producer);
        let mut total_consumed = 0usize;
        let mut sleep = MIN_SLEEP;
        let mut limit_reached = false;

        loop {
            // Sample completion before draining so nothing the producer added
            // before finishing can be left behind.
            let producer_finished = producer_handle.is_finished();
            let records = pipe.consume_available_records();

            if !records.is_empty() {
                match consumer.consume(records).await {
                    Ok(count) => total_consumed += count,
                    Err(e) => {
                        pipe.terminate();
                        let _ = (&mut producer_handle).await;
                        tracing::error!(job_name, error = %e, "Record consumer failed");
                        return Err(e);
                    }
                }
                sleep = MIN_SLEEP;
            } else if producer_finished {
                break;
            } else {
                tokio::time::sleep(sleep).await;
                sleep = (sleep * 2).min(self.max_sleep);
            }

            if limit.is_some_and(|limit| total_consumed >= limit) {
                limit_reached = true;
                pipe.terminate();
                break;
            }
        }

        if limit_reached {
            tracing::debug!(job_name, total_consumed, "Record limit reached, stopping producer");
            let remainder = pipe.consume_available_records();
            if !remainder.is_empty() {
                match consumer.consume(remainder).await {
                    Ok(count) => total_consumed += count,
                    Err(e) => {
                        let _ = (&mut producer_handle).await;
                        return Err(e);
                    }
                }
            }
        }

        let producer_result = producer_handle
            .await
            .map_err(|e| QqqError::Process(format!("Producer task for {job_name} failed: {e}")))?;

        match producer_result {
            Err(e) if e.is_pipe_terminated() && limit_reached => {}
            Err(e) => {
                tracing::error!(job_name, error = %e, "Record producer failed");
                return Err(e);
            }
            Ok(()) => {}
        }

        crate::log_pipe_loop_complete!(job_name, total_consumed, start.elapsed());
        Ok(total_consumed)
    }
}

impl Default for AsyncRecordPipeLoop {
    fn default() -> Self {
        Self::new()
    }
}
