//! Background job processing for SecretHub.
//!
//! This crate provides:
//! - A job queue over the persisted `jobs` table
//! - A job executor that dispatches jobs to the correct handler
//! - A worker runner that polls for and executes queued jobs
//! - The tree checkpoint job and the queue-backed scheduler that feeds it

pub mod executor;
pub mod jobs;
pub mod queue;
pub mod runner;
pub mod scheduler;

pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use queue::JobQueue;
pub use runner::WorkerRunner;
pub use scheduler::QueueTreeCheckpointScheduler;
