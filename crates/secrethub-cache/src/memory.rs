//! In-memory cache implementation using the moka crate.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use secrethub_core::config::cache::MemoryCacheConfig;
use secrethub_core::result::AppResult;
use secrethub_core::traits::cache::CacheProvider;

/// In-memory cache provider using moka.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    cache: Cache<String, String>,
}

impl MemoryCacheProvider {
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.time_to_live_seconds))
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        // Only trailing-wildcard patterns are produced by `keys`.
        let prefix = pattern.trim_end_matches('*');
        let matching: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &matching {
            self.cache.invalidate(key).await;
        }

        let count = matching.len() as u64;
        debug!(pattern, count, "Deleted keys matching pattern");
        Ok(count)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider() -> MemoryCacheProvider {
        MemoryCacheProvider::new(&MemoryCacheConfig {
            max_capacity: 1000,
            time_to_live_seconds: 60,
        })
    }

    #[tokio::test]
    async fn test_delete_pattern_by_prefix() {
        let provider = make_provider();
        for key in [
            "secrethub:secrets:a:1",
            "secrethub:secrets:a:2",
            "secrethub:secrets:b:1",
        ] {
            provider.cache.insert(key.to_string(), "x".to_string()).await;
        }

        let removed = provider.delete_pattern("secrethub:secrets:a:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(provider.cache.get("secrethub:secrets:a:1").await.is_none());
        assert!(provider.cache.get("secrethub:secrets:b:1").await.is_some());
    }

    #[tokio::test]
    async fn test_health_check() {
        assert!(make_provider().health_check().await.unwrap());
    }
}
