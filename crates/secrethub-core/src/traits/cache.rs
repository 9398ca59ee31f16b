//! Cache provider trait for pluggable caching backends.

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for cache backends (Redis or in-memory).
///
/// Secret listings are written by the CRUD paths; the versioning engine
/// only ever evicts them. The provider is responsible for key prefixing.
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Delete all keys matching a glob pattern (e.g., `"secrets:project:*"`).
    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64>;

    /// Check that the cache backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
