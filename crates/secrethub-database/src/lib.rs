//! # secrethub-database
//!
//! PostgreSQL connection management, the transactional storage seam used by
//! the point-in-time engine (with PostgreSQL and in-memory backends), and
//! the job queue repository.

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{MemoryPitStore, PgPitStore, PitStore, PitTransaction};
