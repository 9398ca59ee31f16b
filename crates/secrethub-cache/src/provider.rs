//! Cache manager that dispatches to the configured provider.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use secrethub_core::config::CacheConfig;
use secrethub_core::error::AppError;
use secrethub_core::result::AppResult;
use secrethub_core::traits::cache::CacheProvider;

use crate::keys;

/// Cache manager that wraps the configured cache provider.
#[derive(Debug, Clone)]
pub struct CacheManager {
    inner: Arc<dyn CacheProvider>,
}

impl CacheManager {
    /// Create a new cache manager from configuration.
    pub async fn new(config: &CacheConfig) -> AppResult<Self> {
        let inner: Arc<dyn CacheProvider> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis cache provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Arc::new(crate::redis::RedisCacheProvider::new(client))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory cache provider");
                Arc::new(crate::memory::MemoryCacheProvider::new(&config.memory))
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown cache provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a cache manager from an existing provider.
    pub fn from_provider(provider: Arc<dyn CacheProvider>) -> Self {
        Self { inner: provider }
    }

    /// Drop every cached secret listing of a project.
    pub async fn invalidate_project_secrets(&self, project_id: Uuid) -> AppResult<u64> {
        let removed = self
            .inner
            .delete_pattern(&keys::project_secrets_pattern(project_id))
            .await?;
        debug!(project_id = %project_id, removed, "Invalidated project secret cache");
        Ok(removed)
    }

    /// Check that the configured backend is reachable.
    pub async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}
