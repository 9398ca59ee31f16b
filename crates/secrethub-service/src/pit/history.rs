//! Read-only views of folder history.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use secrethub_core::types::pagination::{PageRequest, PageResponse};
use secrethub_core::{AppError, AppResult};
use secrethub_database::{PitStore, PitTransaction};
use secrethub_entity::checkpoint::CheckpointMarker;
use secrethub_entity::commit::{FolderCommit, ResolvedChange};

use super::reconstruct::{Reconstruction, reconstruct_folder_state, require_commit};

/// A commit with its changes.
#[derive(Debug, Clone, Serialize)]
pub struct CommitDetails {
    pub commit: FolderCommit,
    pub changes: Vec<ResolvedChange>,
    /// Whether no later commit exists on the folder.
    pub is_latest: bool,
}

/// Queries over commits and checkpoints.
#[derive(Debug, Clone)]
pub struct HistoryService {
    store: Arc<dyn PitStore>,
}

impl HistoryService {
    /// Create a new history service.
    pub fn new(store: Arc<dyn PitStore>) -> Self {
        Self { store }
    }

    /// A page of a folder's commits, newest first.
    pub async fn list_commits(
        &self,
        folder_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<FolderCommit>> {
        let mut tx = self.store.begin().await?;
        tx.list_commits(folder_id, page).await
    }

    /// A commit with its resolved changes.
    pub async fn get_commit(&self, folder_commit_id: Uuid) -> AppResult<CommitDetails> {
        let mut tx = self.store.begin().await?;
        let commit = require_commit(tx.as_mut(), folder_commit_id).await?;
        let changes = tx.find_commit_changes(commit.id).await?;
        let is_latest = tx
            .find_latest_commit(commit.folder_id)
            .await?
            .is_some_and(|latest| latest.id == commit.id);

        Ok(CommitDetails {
            commit,
            changes,
            is_latest,
        })
    }

    /// The folder's most recent commit.
    pub async fn latest_commit(&self, folder_id: Uuid) -> AppResult<Option<FolderCommit>> {
        let mut tx = self.store.begin().await?;
        tx.find_latest_commit(folder_id).await
    }

    /// Checkpoints of a folder, newest first.
    pub async fn list_checkpoints(&self, folder_id: Uuid) -> AppResult<Vec<CheckpointMarker>> {
        let mut tx = self.store.begin().await?;
        tx.list_checkpoints(folder_id).await
    }

    /// The folder's most recent checkpoint.
    pub async fn latest_checkpoint(&self, folder_id: Uuid) -> AppResult<Option<CheckpointMarker>> {
        let mut tx = self.store.begin().await?;
        tx.find_nearest_checkpoint(folder_id, None).await
    }

    /// The folder's resource set at a commit, or at its latest commit.
    pub async fn folder_state(
        &self,
        folder_id: Uuid,
        folder_commit_id: Option<Uuid>,
    ) -> AppResult<Reconstruction> {
        let mut tx = self.store.begin().await?;
        let commit = match folder_commit_id {
            Some(id) => require_commit(tx.as_mut(), id).await?,
            None => tx.find_latest_commit(folder_id).await?.ok_or_else(|| {
                AppError::not_found(format!("Folder {folder_id} has no commits"))
            })?,
        };
        if commit.folder_id != folder_id {
            return Err(AppError::bad_request(format!(
                "Commit {} does not belong to folder {folder_id}",
                commit.id
            )));
        }
        reconstruct_folder_state(tx.as_mut(), folder_id, commit.commit_id).await
    }
}
