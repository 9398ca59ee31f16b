//! Tree checkpoint evaluation job.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use secrethub_entity::job::{Job, JobPayload};
use secrethub_service::CheckpointService;

use crate::executor::{JobExecutionError, JobHandler};

/// Job type handled by [`TreeCheckpointJobHandler`].
pub const JOB_TYPE: &str = "folder_tree_checkpoint";

/// Evaluates the tree checkpoint policy of one environment.
#[derive(Debug)]
pub struct TreeCheckpointJobHandler {
    checkpoints: Arc<CheckpointService>,
}

impl TreeCheckpointJobHandler {
    /// Create a handler over the checkpoint service.
    pub fn new(checkpoints: Arc<CheckpointService>) -> Self {
        Self { checkpoints }
    }
}

#[async_trait]
impl JobHandler for TreeCheckpointJobHandler {
    fn job_type(&self) -> &str {
        JOB_TYPE
    }

    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let payload: JobPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| JobExecutionError::Permanent(format!("Invalid payload: {e}")))?;
        let JobPayload::CreateFolderTreeCheckpoint { env_id } = payload;

        let checkpoint = self
            .checkpoints
            .create_folder_tree_checkpoint(env_id)
            .await
            .map_err(JobExecutionError::from_app_error)?;

        match &checkpoint {
            Some(checkpoint) => {
                info!(env_id = %env_id, checkpoint_id = %checkpoint.id, "Tree checkpoint job created checkpoint")
            }
            None => info!(env_id = %env_id, "Tree checkpoint not due"),
        }

        Ok(Some(json!({
            "env_id": env_id,
            "checkpoint_id": checkpoint.map(|c| c.id),
        })))
    }
}
