//! Folder and tree checkpoint creation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use secrethub_core::config::PitConfig;
use secrethub_core::{AppError, AppResult};
use secrethub_database::{PitStore, PitTransaction};
use secrethub_entity::checkpoint::{
    FolderCheckpoint, FolderCheckpointResource, FolderTreeCheckpoint,
    FolderTreeCheckpointResource,
};
use secrethub_entity::commit::FolderCommit;
use secrethub_entity::resource::ResourceKind;

use super::reconstruct::{reconstruct_folder_state, require_commit};
use super::state::StateEntry;

/// Whether enough commits have accumulated to warrant a new checkpoint.
pub fn checkpoint_due(commits_since: i64, window: i64, force: bool) -> bool {
    force || commits_since > window
}

/// Writes folder checkpoints and environment tree checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointService {
    store: Arc<dyn PitStore>,
    config: PitConfig,
}

impl CheckpointService {
    /// Create a new checkpoint service.
    pub fn new(store: Arc<dyn PitStore>, config: PitConfig) -> Self {
        Self { store, config }
    }

    /// Checkpoint a folder at `folder_commit_id`, or at its latest commit.
    ///
    /// Returns `None` when no checkpoint was due.
    pub async fn create_folder_checkpoint(
        &self,
        folder_id: Uuid,
        folder_commit_id: Option<Uuid>,
        force: bool,
    ) -> AppResult<Option<FolderCheckpoint>> {
        let mut tx = self.store.begin().await?;
        let checkpoint = self
            .create_folder_checkpoint_in(tx.as_mut(), folder_id, folder_commit_id, force)
            .await?;
        tx.commit().await?;
        Ok(checkpoint)
    }

    /// [`create_folder_checkpoint`](Self::create_folder_checkpoint) inside
    /// an existing transaction.
    pub async fn create_folder_checkpoint_in(
        &self,
        tx: &mut dyn PitTransaction,
        folder_id: Uuid,
        folder_commit_id: Option<Uuid>,
        force: bool,
    ) -> AppResult<Option<FolderCheckpoint>> {
        if tx.find_folder(folder_id).await?.is_none() {
            return Err(AppError::not_found(format!("Folder {folder_id} not found")));
        }

        let Some(latest) = tx.find_latest_commit(folder_id).await? else {
            debug!(folder_id = %folder_id, "Folder has no commits, skipping checkpoint");
            return Ok(None);
        };

        let anchor = match folder_commit_id {
            Some(id) => {
                let commit = require_commit(tx, id).await?;
                if commit.folder_id != folder_id {
                    return Err(AppError::bad_request(format!(
                        "Commit {id} does not belong to folder {folder_id}"
                    )));
                }
                commit
            }
            None => latest,
        };

        let last = tx.find_nearest_checkpoint(folder_id, None).await?;
        if last.as_ref().is_some_and(|m| m.folder_commit_id == anchor.id) {
            debug!(folder_id = %folder_id, commit_id = anchor.commit_id, "Commit already checkpointed");
            return Ok(None);
        }

        let since = tx
            .count_commits_since(folder_id, last.as_ref().map_or(0, |m| m.commit_id))
            .await?;
        if !checkpoint_due(since, self.config.checkpoint_window, force) {
            debug!(
                folder_id = %folder_id,
                commits_since = since,
                window = self.config.checkpoint_window,
                "Folder checkpoint not due"
            );
            return Ok(None);
        }

        let state = reconstruct_folder_state(tx, folder_id, anchor.commit_id)
            .await?
            .state;

        let checkpoint = FolderCheckpoint {
            id: Uuid::new_v4(),
            folder_commit_id: anchor.id,
            created_at: Utc::now(),
        };
        tx.insert_checkpoint(&checkpoint).await?;

        let rows: Vec<FolderCheckpointResource> = state
            .iter()
            .map(|entry| checkpoint_row(checkpoint.id, entry))
            .collect();
        for chunk in rows.chunks(self.config.checkpoint_batch_size.max(1)) {
            tx.insert_checkpoint_resources(chunk).await?;
        }

        info!(
            folder_id = %folder_id,
            checkpoint_id = %checkpoint.id,
            commit_id = anchor.commit_id,
            resources = rows.len(),
            "Folder checkpoint created"
        );

        Ok(Some(checkpoint))
    }

    /// Evaluate and possibly write a tree checkpoint for an environment.
    pub async fn create_folder_tree_checkpoint(
        &self,
        env_id: Uuid,
    ) -> AppResult<Option<FolderTreeCheckpoint>> {
        let mut tx = self.store.begin().await?;
        let checkpoint = self
            .create_folder_tree_checkpoint_in(tx.as_mut(), env_id, false)
            .await?;
        tx.commit().await?;
        Ok(checkpoint)
    }

    /// [`create_folder_tree_checkpoint`](Self::create_folder_tree_checkpoint)
    /// inside an existing transaction.
    pub async fn create_folder_tree_checkpoint_in(
        &self,
        tx: &mut dyn PitTransaction,
        env_id: Uuid,
        force: bool,
    ) -> AppResult<Option<FolderTreeCheckpoint>> {
        let Some(latest) = tx.find_latest_env_commit(env_id).await? else {
            debug!(env_id = %env_id, "Environment has no commits, skipping tree checkpoint");
            return Ok(None);
        };

        let last = tx.find_nearest_tree_checkpoint(env_id, None).await?;
        if last.as_ref().is_some_and(|m| m.folder_commit_id == latest.id) {
            debug!(env_id = %env_id, "Latest commit already has a tree checkpoint");
            return Ok(None);
        }

        let since = tx
            .count_env_commits_since(env_id, last.as_ref().map_or(0, |m| m.position))
            .await?;
        if !checkpoint_due(since, self.config.tree_checkpoint_window, force) {
            debug!(
                env_id = %env_id,
                commits_since = since,
                window = self.config.tree_checkpoint_window,
                "Tree checkpoint not due"
            );
            return Ok(None);
        }

        let folder_ids: Vec<Uuid> = tx
            .find_folders_by_env(env_id)
            .await?
            .into_iter()
            .filter(|f| !f.is_reserved)
            .map(|f| f.id)
            .collect();
        let commits = tx.find_latest_commits_for_folders(&folder_ids).await?;

        let checkpoint = FolderTreeCheckpoint {
            id: Uuid::new_v4(),
            folder_commit_id: latest.id,
            created_at: Utc::now(),
        };
        tx.insert_tree_checkpoint(&checkpoint).await?;

        let now = Utc::now();
        let rows: Vec<FolderTreeCheckpointResource> = commits
            .iter()
            .map(|commit| FolderTreeCheckpointResource {
                id: Uuid::new_v4(),
                folder_tree_checkpoint_id: checkpoint.id,
                folder_id: commit.folder_id,
                folder_commit_id: commit.id,
                created_at: now,
            })
            .collect();
        for chunk in rows.chunks(self.config.checkpoint_batch_size.max(1)) {
            tx.insert_tree_checkpoint_resources(chunk).await?;
        }

        info!(
            env_id = %env_id,
            tree_checkpoint_id = %checkpoint.id,
            folders = rows.len(),
            "Tree checkpoint created"
        );

        Ok(Some(checkpoint))
    }

    /// Every folder's latest commit at or before `position`.
    pub async fn resolve_folder_commits_at(
        &self,
        env_id: Uuid,
        position: i64,
    ) -> AppResult<BTreeMap<Uuid, FolderCommit>> {
        let mut tx = self.store.begin().await?;
        resolve_folder_commits_at(tx.as_mut(), env_id, position).await
    }
}

/// Every folder's latest commit at or before `position`, seeded from the
/// nearest tree checkpoint.
pub async fn resolve_folder_commits_at(
    tx: &mut dyn PitTransaction,
    env_id: Uuid,
    position: i64,
) -> AppResult<BTreeMap<Uuid, FolderCommit>> {
    let mut commits = BTreeMap::new();
    let mut after = 0;

    if let Some(marker) = tx.find_nearest_tree_checkpoint(env_id, Some(position)).await? {
        for commit in tx.find_tree_checkpoint_commits(marker.checkpoint_id).await? {
            if commit.position <= position {
                commits.insert(commit.folder_id, commit);
            } else if let Some(earlier) =
                tx.find_commit_at_position(commit.folder_id, position).await?
            {
                commits.insert(earlier.folder_id, earlier);
            }
        }
        after = marker.position;
    }

    for commit in tx.find_env_commits_between(env_id, after, position).await? {
        commits.insert(commit.folder_id, commit);
    }

    Ok(commits)
}

fn checkpoint_row(checkpoint_id: Uuid, entry: &StateEntry) -> FolderCheckpointResource {
    let resource = &entry.resource;
    let (secret_version_id, folder_version_id) = match resource.kind {
        ResourceKind::Secret => (Some(resource.version_id), None),
        ResourceKind::Folder => (None, Some(resource.version_id)),
    };
    FolderCheckpointResource {
        id: Uuid::new_v4(),
        folder_checkpoint_id: checkpoint_id,
        secret_version_id,
        folder_version_id,
        commit_id: entry.commit_id,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrethub_entity::resource::ResourceVersion;

    #[test]
    fn test_checkpoint_due_after_window() {
        assert!(!checkpoint_due(0, 5, false));
        assert!(!checkpoint_due(5, 5, false));
        assert!(checkpoint_due(6, 5, false));
    }

    #[test]
    fn test_force_overrides_window() {
        assert!(checkpoint_due(0, 100, true));
    }

    #[test]
    fn test_checkpoint_row_sets_one_reference() {
        let id = Uuid::new_v4();
        let secret = StateEntry {
            resource: ResourceVersion::secret(Uuid::new_v4(), Uuid::new_v4(), "DB_URL", 1),
            commit_id: 3,
        };
        let row = checkpoint_row(id, &secret);
        assert_eq!(row.secret_version_id, Some(secret.resource.version_id));
        assert!(row.folder_version_id.is_none());
        assert_eq!(row.commit_id, 3);

        let folder = StateEntry {
            resource: ResourceVersion::folder(Uuid::new_v4(), Uuid::new_v4(), "api", 2),
            commit_id: 1,
        };
        let row = checkpoint_row(id, &folder);
        assert!(row.secret_version_id.is_none());
        assert_eq!(row.folder_version_id, Some(folder.resource.version_id));
        assert_eq!(row.commit_id, 1);
    }
}
