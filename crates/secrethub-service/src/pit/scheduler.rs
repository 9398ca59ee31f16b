//! Hand-off point for background tree checkpoint evaluation.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use secrethub_core::AppResult;

/// Enqueues a tree checkpoint evaluation for an environment.
///
/// Implementations must return quickly; the evaluation itself runs
/// elsewhere and calls
/// [`CheckpointService::create_folder_tree_checkpoint`](super::checkpoint::CheckpointService::create_folder_tree_checkpoint).
#[async_trait]
pub trait TreeCheckpointScheduler: Send + Sync + std::fmt::Debug {
    /// Request an evaluation for `env_id`.
    async fn schedule_tree_checkpoint(&self, env_id: Uuid) -> AppResult<()>;
}

/// Schedule an evaluation, logging instead of failing.
pub(crate) async fn schedule_quietly(scheduler: &dyn TreeCheckpointScheduler, env_id: Uuid) {
    if let Err(e) = scheduler.schedule_tree_checkpoint(env_id).await {
        warn!(env_id = %env_id, error = %e, "Failed to schedule tree checkpoint");
    }
}
