//! Worker runner: polls the queue and executes jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::time;
use tracing::{error, info, trace, warn};

use secrethub_core::config::WorkerConfig;
use secrethub_entity::job::Job;

use crate::executor::{JobExecutionError, JobExecutor};
use crate::queue::{JobQueue, PIT_QUEUE, retry_backoff};

/// How long shutdown waits for in-flight jobs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Main worker runner that polls queues and executes jobs.
#[derive(Debug)]
pub struct WorkerRunner {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
    /// Queues to poll, in priority order.
    queues: Vec<String>,
}

impl WorkerRunner {
    /// Create a runner polling the point-in-time queue.
    pub fn new(queue: Arc<JobQueue>, executor: Arc<JobExecutor>, config: WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            config,
            queues: vec![PIT_QUEUE.to_string()],
        }
    }

    /// Set the queues to poll.
    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    /// Run until the cancel signal flips to `true`.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        info!(
            worker_id = %self.queue.worker_id(),
            concurrency,
            poll_interval_seconds = self.config.poll_interval_seconds,
            queues = ?self.queues,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!(worker_id = %self.queue.worker_id(), "Worker received shutdown signal");
                        break;
                    }
                }
                claimed = self.poll_and_execute(&semaphore) => {
                    if claimed {
                        continue;
                    }
                    tokio::select! {
                        _ = cancel.changed() => {
                            if *cancel.borrow() {
                                info!(worker_id = %self.queue.worker_id(), "Worker shutting down");
                                break;
                            }
                        }
                        _ = time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.queue.worker_id(), "Waiting for in-flight jobs");
        if time::timeout(SHUTDOWN_GRACE, semaphore.acquire_many(concurrency as u32))
            .await
            .is_err()
        {
            warn!(worker_id = %self.queue.worker_id(), "In-flight jobs still running at shutdown");
        }
        info!(worker_id = %self.queue.worker_id(), "Worker shut down");
    }

    /// Claim one job and spawn it. Returns whether a job was claimed.
    async fn poll_and_execute(&self, semaphore: &Arc<Semaphore>) -> bool {
        let permit = match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                trace!("All worker slots occupied");
                return false;
            }
        };

        let queues: Vec<&str> = self.queues.iter().map(String::as_str).collect();
        match self.queue.dequeue(&queues).await {
            Ok(Some(job)) => {
                let queue = Arc::clone(&self.queue);
                let executor = Arc::clone(&self.executor);
                tokio::spawn(async move {
                    let _permit = permit;
                    process_job(&queue, &executor, job).await;
                });
                true
            }
            Ok(None) => {
                trace!("No jobs available");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to dequeue job");
                false
            }
        }
    }
}

/// Execute one claimed job and record its outcome.
pub async fn process_job(queue: &JobQueue, executor: &JobExecutor, job: Job) {
    info!(
        job_id = %job.id,
        job_type = %job.job_type,
        attempt = job.attempts,
        max_attempts = job.max_attempts,
        "Processing job"
    );

    let outcome = executor.execute(&job).await;
    let recorded = match outcome {
        Ok(result) => {
            info!(job_id = %job.id, "Job completed");
            queue.complete(job.id, result).await
        }
        Err(JobExecutionError::Transient(msg)) if job.can_retry() => {
            let delay = retry_backoff(job.attempts);
            warn!(job_id = %job.id, error = %msg, delay_seconds = delay.as_secs(), "Job failed, will retry");
            queue.reschedule(job.id, &msg, delay).await.map(|_| ())
        }
        Err(e) => {
            let msg = e.to_string();
            error!(job_id = %job.id, error = %msg, "Job failed");
            queue.fail(job.id, &msg).await
        }
    };

    if let Err(e) = recorded {
        error!(job_id = %job.id, error = %e, "Failed to record job outcome");
    }
}
