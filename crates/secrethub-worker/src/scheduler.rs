//! Queue-backed tree checkpoint scheduling.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use secrethub_core::AppResult;
use secrethub_entity::job::JobPayload;
use secrethub_service::TreeCheckpointScheduler;

use crate::queue::{JobQueue, job_for};

/// Schedules tree checkpoint evaluations as persisted jobs.
///
/// A pending evaluation for the same environment absorbs new requests, so a
/// burst of commits yields one job.
#[derive(Debug, Clone)]
pub struct QueueTreeCheckpointScheduler {
    queue: Arc<JobQueue>,
    max_attempts: i32,
}

impl QueueTreeCheckpointScheduler {
    pub fn new(queue: Arc<JobQueue>, max_attempts: i32) -> Self {
        Self {
            queue,
            max_attempts,
        }
    }
}

#[async_trait]
impl TreeCheckpointScheduler for QueueTreeCheckpointScheduler {
    async fn schedule_tree_checkpoint(&self, env_id: Uuid) -> AppResult<()> {
        let job = job_for(
            &JobPayload::CreateFolderTreeCheckpoint { env_id },
            self.max_attempts,
        )?;
        self.queue.enqueue_unique(&job).await?;
        Ok(())
    }
}
