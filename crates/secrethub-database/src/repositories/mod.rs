//! Concrete repositories over the shared pool.

pub mod job;

pub use job::JobRepository;
