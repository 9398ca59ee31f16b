//! Job queue over the persisted `jobs` table.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use secrethub_core::AppResult;
use secrethub_core::types::{PageRequest, PageResponse};
use secrethub_database::repositories::JobRepository;
use secrethub_entity::job::{CreateJob, Job, JobPayload, JobPriority};

/// Queue polled for point-in-time maintenance jobs.
pub const PIT_QUEUE: &str = "pit";

/// Delay before the next attempt of a job that failed transiently.
///
/// Doubles per attempt starting at 5 seconds, capped at 5 minutes.
pub fn retry_backoff(attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let seconds = 5u64.saturating_mul(1u64 << exponent);
    Duration::from_secs(seconds.min(300))
}

/// Build the row for a typed payload.
pub fn job_for(payload: &JobPayload, max_attempts: i32) -> AppResult<CreateJob> {
    Ok(CreateJob {
        job_type: payload.job_type().to_string(),
        queue: PIT_QUEUE.to_string(),
        priority: JobPriority::Normal,
        payload: serde_json::to_value(payload)?,
        max_attempts,
        scheduled_at: None,
    })
}

/// Job queue for enqueuing and claiming work.
#[derive(Debug, Clone)]
pub struct JobQueue {
    repo: Arc<JobRepository>,
    worker_id: String,
}

impl JobQueue {
    /// Create a queue that claims jobs as `worker_id`.
    pub fn new(repo: Arc<JobRepository>, worker_id: impl Into<String>) -> Self {
        Self {
            repo,
            worker_id: worker_id.into(),
        }
    }

    /// Identifier recorded on claimed jobs.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Enqueue a new job.
    pub async fn enqueue(&self, job: &CreateJob) -> AppResult<Job> {
        let created = self.repo.create(job).await?;
        debug!(job_id = %created.id, job_type = %created.job_type, queue = %created.queue, "Enqueued job");
        Ok(created)
    }

    /// Enqueue unless an identical job is already pending.
    pub async fn enqueue_unique(&self, job: &CreateJob) -> AppResult<Option<Job>> {
        let created = self.repo.create_unique(job).await?;
        match &created {
            Some(created) => {
                debug!(job_id = %created.id, job_type = %created.job_type, "Enqueued job")
            }
            None => debug!(job_type = %job.job_type, "Identical job already pending"),
        }
        Ok(created)
    }

    /// Claim the next due job, trying queues in order.
    pub async fn dequeue(&self, queues: &[&str]) -> AppResult<Option<Job>> {
        for queue in queues {
            if let Some(job) = self.repo.dequeue(queue, &self.worker_id).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Mark a job as completed.
    pub async fn complete(&self, job_id: Uuid, result: Option<Value>) -> AppResult<()> {
        self.repo.complete(job_id, result.as_ref()).await
    }

    /// Mark a job as permanently failed.
    pub async fn fail(&self, job_id: Uuid, error_message: &str) -> AppResult<()> {
        self.repo.fail(job_id, error_message).await
    }

    /// Put a job back in the queue after `delay`.
    pub async fn reschedule(
        &self,
        job_id: Uuid,
        error_message: &str,
        delay: Duration,
    ) -> AppResult<DateTime<Utc>> {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        let run_at = Utc::now() + delay;
        self.repo.reschedule(job_id, error_message, run_at).await?;
        Ok(run_at)
    }

    /// Requeue a failed job with a fresh attempt budget.
    pub async fn retry(&self, job_id: Uuid) -> AppResult<bool> {
        self.repo.retry(job_id).await
    }

    /// Find a job by ID.
    pub async fn find(&self, job_id: Uuid) -> AppResult<Option<Job>> {
        self.repo.find_by_id(job_id).await
    }

    /// List jobs, newest first.
    pub async fn list(&self, page: &PageRequest) -> AppResult<PageResponse<Job>> {
        self.repo.find_all(page).await
    }

    /// Delete finished jobs last updated before `before`.
    pub async fn cleanup(&self, before: DateTime<Utc>) -> AppResult<u64> {
        self.repo.cleanup_old(before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1), Duration::from_secs(5));
        assert_eq!(retry_backoff(2), Duration::from_secs(10));
        assert_eq!(retry_backoff(3), Duration::from_secs(20));
        assert_eq!(retry_backoff(10), Duration::from_secs(300));
        assert_eq!(retry_backoff(0), Duration::from_secs(5));
    }

    #[test]
    fn test_job_for_payload() {
        let env_id = Uuid::new_v4();
        let job = job_for(&JobPayload::CreateFolderTreeCheckpoint { env_id }, 3).unwrap();
        assert_eq!(job.job_type, "folder_tree_checkpoint");
        assert_eq!(job.queue, PIT_QUEUE);
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.payload["env_id"], env_id.to_string());
    }
}
