//! Job executor that dispatches jobs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use secrethub_core::AppError;
use secrethub_core::error::ErrorKind;
use secrethub_entity::job::Job;

/// Trait for job handler implementations.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// Job type this handler processes.
    fn job_type(&self) -> &str;

    /// Execute the job with its payload.
    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError>;
}

/// Error from job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Do not retry.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// May succeed on a later attempt.
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

impl JobExecutionError {
    /// Classify an engine error: storage and cache outages are retried,
    /// everything else fails the job.
    pub fn from_app_error(err: AppError) -> Self {
        match err.kind {
            ErrorKind::Database | ErrorKind::Cache | ErrorKind::ServiceUnavailable => {
                Self::Transient(err.to_string())
            }
            _ => Self::Internal(err),
        }
    }

    /// Whether the job may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Dispatches jobs to the appropriate handler based on `job_type`.
#[derive(Debug)]
pub struct JobExecutor {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a job handler, replacing any handler for the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        info!(job_type = %job_type, "Registered job handler");
        self.handlers.insert(job_type, handler);
    }

    /// Execute a job by dispatching to the correct handler.
    pub async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let handler = self.handlers.get(&job.job_type).ok_or_else(|| {
            JobExecutionError::Permanent(format!(
                "No handler registered for job type '{}'",
                job.job_type
            ))
        })?;

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            "Executing job"
        );

        handler.execute(job).await
    }

    /// Check if a handler is registered for a job type.
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use chrono::Utc;
    use secrethub_entity::job::{JobPriority, JobStatus};
    use uuid::Uuid;

    pub(crate) fn job(job_type: &str, payload: Value) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            queue: "pit".to_string(),
            priority: JobPriority::Normal,
            payload,
            result: None,
            error_message: None,
            status: JobStatus::Running,
            attempts: 1,
            max_attempts: 3,
            scheduled_at: None,
            started_at: Some(now),
            completed_at: None,
            worker_id: Some("test".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[derive(Debug)]
    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        fn job_type(&self) -> &str {
            "echo"
        }

        async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
            Ok(Some(job.payload.clone()))
        }
    }

    #[tokio::test]
    async fn test_dispatches_to_registered_handler() {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(EchoHandler));
        assert!(executor.has_handler("echo"));
        assert_eq!(executor.registered_types(), vec!["echo".to_string()]);

        let payload = serde_json::json!({ "n": 1 });
        let result = executor
            .execute(&job("echo", payload.clone()))
            .await
            .unwrap();
        assert_eq!(result, Some(payload));
    }

    #[tokio::test]
    async fn test_unknown_job_type_is_permanent() {
        let executor = JobExecutor::default();
        let err = executor
            .execute(&job("missing", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, JobExecutionError::Permanent(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_app_error_classification() {
        let err = JobExecutionError::from_app_error(AppError::database("connection reset"));
        assert!(err.is_retryable());

        let err = JobExecutionError::from_app_error(AppError::data_integrity("cycle"));
        assert!(matches!(err, JobExecutionError::Internal(_)));
    }
}
