//! Bounded hand-off buffer between a record producer and a record consumer

use crate::domain::errors::QqqError;
use crate::domain::record::Record;
use crate::domain::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Default number of records a pipe buffers before producers wait
pub const DEFAULT_PIPE_CAPACITY: usize = 1000;

/// Thread-safe FIFO buffer of records with a terminated flag and back-pressure
///
/// A producer calls [`RecordPipe::add_record`]; a consumer repeatedly calls
/// [`RecordPipe::consume_available_records`]. Once [`RecordPipe::terminate`] has
/// been called, adds fail with [`QqqError::PipeTerminated`] so a cooperative
/// producer stops at its next `?`. Records accepted before termination are
/// always left for the consumer.
///
/// # Examples
///
/// ```
/// use qqq::core::pipe::RecordPipe;
/// use qqq::domain::Record;
///
/// # async fn example() -> qqq::domain::Result<()> {
/// let pipe = RecordPipe::new();
/// pipe.add_record(Record::new().with_value("id", 1)).await?;
/// pipe.add_record(Record::new().with_value("id", 2)).await?;
///
/// let drained = pipe.consume_available_records();
/// assert_eq!(drained.len(), 2);
/// assert_eq!(pipe.count(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RecordPipe {
    buffer: Mutex<Vec<Record>>,
    capacity: Option<usize>,
    terminated: AtomicBool,
    total_added: AtomicUsize,
    space_available: Notify,
}

impl RecordPipe {
    /// Create a pipe with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(Some(DEFAULT_PIPE_CAPACITY))
    }

    /// Create a pipe with the given capacity (`None` for unbounded)
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            capacity: capacity.map(|c| c.max(1)),
            terminated: AtomicBool::new(false),
            total_added: AtomicUsize::new(0),
            space_available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record, waiting while the pipe is full
    ///
    /// # Errors
    ///
    /// Returns [`QqqError::PipeTerminated`] if the pipe was terminated before the
    /// record could be accepted.
    pub async fn add_record(&self, record: Record) -> Result<()> {
        loop {
            // Register interest before checking, so a drain between the check
            // and the await still wakes us.
            let space_available = self.space_available.notified();

            {
                let mut buffer = self.lock();
                if self.terminated.load(Ordering::Acquire) {
                    return Err(QqqError::PipeTerminated);
                }
                if self.capacity.map_or(true, |capacity| buffer.len() < capacity) {
                    buffer.push(record);
                    self.total_added.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            }

            tracing::trace!(capacity = ?self.capacity, "Record pipe full, waiting for consumer");
            space_available.await;
        }
    }

    /// Append several records in order
    ///
    /// # Errors
    ///
    /// Returns [`QqqError::PipeTerminated`] if the pipe was terminated part-way;
    /// records accepted before that point stay in the pipe.
    pub async fn add_records(&self, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.add_record(record).await?;
        }
        Ok(())
    }

    /// Detach and return everything currently buffered (possibly nothing). Never blocks
    /// on the producer.
    pub fn consume_available_records(&self) -> Vec<Record> {
        let drained = std::mem::take(&mut *self.lock());
        if !drained.is_empty() {
            self.space_available.notify_waiters();
        }
        drained
    }

    /// Mark the pipe as terminated and wake any producer waiting for space
    pub fn terminate(&self) {
        {
            let _buffer = self.lock();
            self.terminated.store(true, Ordering::Release);
        }
        self.space_available.notify_waiters();
    }

    /// Whether [`RecordPipe::terminate`] has been called
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Number of records currently buffered
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Number of records ever accepted by this pipe
    pub fn total_added(&self) -> usize {
        self.total_added.load(Ordering::Relaxed)
    }
}

impl Default for RecordPipe {
    fn default() -> Self {
        Self::new()
    }
}
