//! Core traits defined in `secrethub-core` and implemented by other crates.

pub mod cache;

pub use cache::CacheProvider;
