//! Job lifecycle engine.
//!
//! Ingestion publishes content-addressed scratch directories to the pending
//! registry; the worker pool pulls them in FIFO order and the per-job
//! executor drives each one through conversions, writers, outcome
//! recording, and the optional completion callback.

pub mod callback;
mod executor;
pub mod instructions;
pub mod manager;
pub mod queue;
pub mod spec;
pub mod worker_pool;

pub use instructions::{read_instructions, write_instructions, InstructionRecord};
pub use manager::{JobManager, UploadReceipt};
pub use queue::{JobQueue, JobState};
pub use spec::{expected_files, output_filename, CombinedJob, ConversionStep, WriterStep};
pub use worker_pool::{spawn_worker_pool, WorkerPoolConfig};
