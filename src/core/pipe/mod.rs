//! Record pipe and the producer/consumer loop that drains it

pub mod pipe_loop;
pub mod record_pipe;

pub use pipe_loop::{AsyncRecordPipeLoop, RecordConsumer, DEFAULT_MAX_SLEEP};
pub use record_pipe::{RecordPipe, DEFAULT_PIPE_CAPACITY};
