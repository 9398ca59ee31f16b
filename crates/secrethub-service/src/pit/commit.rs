//! Commit creation.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use secrethub_core::config::PitConfig;
use secrethub_core::{AppError, AppResult};
use secrethub_database::{PitStore, PitTransaction};
use secrethub_entity::commit::{
    Actor, ActorMetadata, CommitChangeType, FolderCommit, FolderCommitChange, NewCommitChange,
    NewFolderCommit,
};
use secrethub_entity::folder::Folder;
use secrethub_entity::resource::ResourceKind;

use super::checkpoint::CheckpointService;
use super::reconstruct::{reconstruct_folder_state, require_commit};
use super::scheduler::{TreeCheckpointScheduler, schedule_quietly};

/// Savepoint wrapping checkpoint writes made while committing.
const CHECKPOINT_SAVEPOINT: &str = "pit_checkpoint";

/// A request to record changes against a folder.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Who made the changes.
    pub actor: Actor,
    /// Commit message.
    pub message: Option<String>,
    /// Folder the changes apply to.
    pub folder_id: Uuid,
    /// The changes.
    pub changes: Vec<NewCommitChange>,
    /// Keep secret updates whose content equals the previous version.
    pub omit_ignore_filter: bool,
}

impl CommitRequest {
    /// A request with no message and the ignore filter enabled.
    pub fn new(actor: Actor, folder_id: Uuid, changes: Vec<NewCommitChange>) -> Self {
        Self {
            actor,
            message: None,
            folder_id,
            changes,
            omit_ignore_filter: false,
        }
    }

    /// Set the commit message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Record every change, including no-op secret updates.
    pub fn omit_ignore_filter(mut self) -> Self {
        self.omit_ignore_filter = true;
        self
    }
}

/// Appends commits to folder histories.
#[derive(Debug, Clone)]
pub struct CommitService {
    store: Arc<dyn PitStore>,
    checkpoints: Arc<CheckpointService>,
    scheduler: Arc<dyn TreeCheckpointScheduler>,
    config: PitConfig,
}

impl CommitService {
    /// Create a new commit service.
    pub fn new(
        store: Arc<dyn PitStore>,
        checkpoints: Arc<CheckpointService>,
        scheduler: Arc<dyn TreeCheckpointScheduler>,
        config: PitConfig,
    ) -> Self {
        Self {
            store,
            checkpoints,
            scheduler,
            config,
        }
    }

    /// Record a commit and schedule a tree checkpoint evaluation.
    ///
    /// Returns `None` when the ignore filter left nothing to record.
    pub async fn create_commit(&self, request: CommitRequest) -> AppResult<Option<FolderCommit>> {
        let mut tx = self.store.begin().await?;
        let commit = self.create_commit_in(tx.as_mut(), request).await?;
        tx.commit().await?;

        if let Some(commit) = &commit {
            schedule_quietly(self.scheduler.as_ref(), commit.env_id).await;
        }
        Ok(commit)
    }

    /// [`create_commit`](Self::create_commit) inside an existing transaction.
    ///
    /// The caller is responsible for scheduling the tree checkpoint after
    /// committing.
    pub async fn create_commit_in(
        &self,
        tx: &mut dyn PitTransaction,
        request: CommitRequest,
    ) -> AppResult<Option<FolderCommit>> {
        for change in &request.changes {
            change.validate()?;
        }

        let folder = tx
            .find_folder(request.folder_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {} not found", request.folder_id)))?;
        let actor = resolve_actor(tx, &request.actor).await?;

        let changes = self
            .check_changes(tx, request.changes, request.omit_ignore_filter)
            .await?;
        if changes.is_empty() && !request.omit_ignore_filter {
            debug!(folder_id = %folder.id, "No changes left after ignore filter");
            return Ok(None);
        }

        tx.lock_folder(folder.id).await?;

        let deleted_folders = deleted_folder_versions(&changes);
        let commit = insert_commit(
            tx,
            folder.id,
            folder.env_id,
            &request.actor,
            actor,
            request.message,
            changes,
        )
        .await?;

        for version_id in deleted_folders {
            let Some(version) = tx.find_folder_version(version_id).await? else {
                continue;
            };
            let mut visited = HashSet::from([folder.id]);
            self.delete_nested_folder(
                tx,
                version.folder_id,
                version.name,
                folder.name.clone(),
                &request.actor,
                1,
                &mut visited,
            )
            .await?;
        }

        self.write_checkpoints(tx, &folder, &commit).await?;

        info!(
            folder_id = %folder.id,
            commit_id = commit.commit_id,
            folder_commit_id = %commit.id,
            actor_type = %commit.actor_type,
            "Folder commit created"
        );

        Ok(Some(commit))
    }

    /// Evaluate the folder checkpoint and, for a root folder of an
    /// environment without one, the first tree checkpoint. Each runs under a
    /// savepoint; a failure is logged and undone while the commit stands.
    async fn write_checkpoints(
        &self,
        tx: &mut dyn PitTransaction,
        folder: &Folder,
        commit: &FolderCommit,
    ) -> AppResult<()> {
        tx.savepoint(CHECKPOINT_SAVEPOINT).await?;
        let result = self
            .checkpoints
            .create_folder_checkpoint_in(tx, folder.id, Some(commit.id), false)
            .await
            .map(|_| ());
        settle_checkpoint(tx, result, folder.id, "Folder checkpoint").await?;

        if folder.is_root() && tx.find_nearest_tree_checkpoint(folder.env_id, None).await?.is_none() {
            tx.savepoint(CHECKPOINT_SAVEPOINT).await?;
            let result = self
                .checkpoints
                .create_folder_tree_checkpoint_in(tx, folder.env_id, true)
                .await
                .map(|_| ());
            settle_checkpoint(tx, result, folder.id, "Tree checkpoint").await?;
        }
        Ok(())
    }

    /// Attach one more change to an existing commit.
    pub async fn add_commit_change(
        &self,
        folder_commit_id: Uuid,
        change: NewCommitChange,
    ) -> AppResult<FolderCommitChange> {
        change.validate()?;

        let mut tx = self.store.begin().await?;
        require_commit(tx.as_mut(), folder_commit_id).await?;

        let row = change.into_change(folder_commit_id);
        tx.insert_commit_changes(std::slice::from_ref(&row)).await?;
        tx.commit().await?;

        debug!(folder_commit_id = %folder_commit_id, change_id = %row.id, "Commit change added");
        Ok(row)
    }

    /// Give a folder without history an initial commit adding everything it
    /// currently holds.
    pub async fn initialize_folder(&self, folder_id: Uuid) -> AppResult<Option<FolderCommit>> {
        let mut tx = self.store.begin().await?;

        if tx.find_latest_commit(folder_id).await?.is_some() {
            debug!(folder_id = %folder_id, "Folder already has history");
            return Ok(None);
        }

        let mut changes: Vec<NewCommitChange> = tx
            .find_folder_secret_versions(folder_id)
            .await?
            .iter()
            .map(|v| NewCommitChange::secret(CommitChangeType::Add, v.id))
            .collect();
        changes.extend(
            tx.find_child_folder_versions(folder_id)
                .await?
                .iter()
                .map(|v| NewCommitChange::folder(CommitChangeType::Add, v.id)),
        );

        let request = CommitRequest::new(Actor::Platform, folder_id, changes)
            .with_message("Initialized folder")
            .omit_ignore_filter();
        let commit = self.create_commit_in(tx.as_mut(), request).await?;
        tx.commit().await?;

        if let Some(commit) = &commit {
            schedule_quietly(self.scheduler.as_ref(), commit.env_id).await;
        }
        Ok(commit)
    }

    /// Check that every referenced version exists and, unless the filter is
    /// off, drop secret updates that repeat the previous version's content.
    async fn check_changes(
        &self,
        tx: &mut dyn PitTransaction,
        changes: Vec<NewCommitChange>,
        omit_ignore_filter: bool,
    ) -> AppResult<Vec<NewCommitChange>> {
        let mut kept = Vec::with_capacity(changes.len());

        for change in changes {
            if let Some(id) = change.folder_version_id {
                if tx.find_folder_version(id).await?.is_none() {
                    return Err(AppError::not_found(format!("Folder version {id} not found")));
                }
                kept.push(change);
                continue;
            }

            let Some(id) = change.secret_version_id else {
                continue;
            };
            let version = tx
                .find_secret_version(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Secret version {id} not found")))?;

            if !omit_ignore_filter && change.change_type == CommitChangeType::Update {
                let previous = tx
                    .find_previous_secret_version(version.secret_id, version.version)
                    .await?;
                if previous.is_some_and(|p| p.has_same_content(&version)) {
                    debug!(secret_id = %version.secret_id, version = version.version, "Ignoring unchanged secret update");
                    continue;
                }
            }
            kept.push(change);
        }

        Ok(kept)
    }

    /// Record a commit deleting everything a removed subfolder held, then
    /// do the same for the folders it contained.
    #[allow(clippy::too_many_arguments)]
    fn delete_nested_folder<'a>(
        &'a self,
        tx: &'a mut dyn PitTransaction,
        folder_id: Uuid,
        folder_name: String,
        parent_name: String,
        actor: &'a Actor,
        depth: usize,
        visited: &'a mut HashSet<Uuid>,
    ) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            if !visited.insert(folder_id) {
                return Err(AppError::data_integrity(format!(
                    "Folder {folder_id} appears twice in its own ancestry"
                )));
            }
            if depth > self.config.max_folder_depth {
                warn!(
                    folder_id = %folder_id,
                    max_depth = self.config.max_folder_depth,
                    "Nested folder deletion exceeds maximum depth, stopping"
                );
                return Ok(());
            }

            let Some(latest) = tx.find_latest_commit(folder_id).await? else {
                return Ok(());
            };
            let state = reconstruct_folder_state(tx, folder_id, latest.commit_id)
                .await?
                .state;
            if state.is_empty() {
                return Ok(());
            }

            let changes = state
                .iter()
                .map(|entry| match entry.resource.kind {
                    ResourceKind::Secret => {
                        NewCommitChange::secret(CommitChangeType::Delete, entry.resource.version_id)
                    }
                    ResourceKind::Folder => {
                        NewCommitChange::folder(CommitChangeType::Delete, entry.resource.version_id)
                    }
                })
                .collect();
            let children: Vec<(Uuid, String)> = state
                .iter()
                .filter(|entry| entry.resource.kind == ResourceKind::Folder)
                .map(|entry| (entry.resource.resource_id, entry.resource.name.clone()))
                .collect();

            let metadata = resolve_actor(tx, actor).await?;
            tx.lock_folder(folder_id).await?;
            let commit = insert_commit(
                tx,
                folder_id,
                latest.env_id,
                actor,
                metadata,
                Some(format!("Parent folder {parent_name} deleted")),
                changes,
            )
            .await?;
            debug!(folder_id = %folder_id, commit_id = commit.commit_id, "Nested folder delete recorded");

            for (child_id, child_name) in children {
                self.delete_nested_folder(
                    tx,
                    child_id,
                    child_name,
                    folder_name.clone(),
                    actor,
                    depth + 1,
                    visited,
                )
                .await?;
            }
            Ok(())
        })
    }
}

/// Keep the checkpoint written since the savepoint, or log why it failed and
/// discard it.
async fn settle_checkpoint(
    tx: &mut dyn PitTransaction,
    result: AppResult<()>,
    folder_id: Uuid,
    what: &str,
) -> AppResult<()> {
    if let Err(e) = result {
        warn!(folder_id = %folder_id, error = %e, "{what} creation failed, commit kept without it");
        tx.rollback_to_savepoint(CHECKPOINT_SAVEPOINT).await?;
    }
    tx.release_savepoint(CHECKPOINT_SAVEPOINT).await
}

/// Resolve the display metadata recorded with a commit.
async fn resolve_actor(tx: &mut dyn PitTransaction, actor: &Actor) -> AppResult<ActorMetadata> {
    match actor {
        Actor::User(id) => {
            let user = tx
                .find_user(*id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("User {id} not found")))?;
            Ok(ActorMetadata::new(Some(user.id), Some(user.username)))
        }
        Actor::Identity(id) => {
            let identity = tx
                .find_identity(*id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Identity {id} not found")))?;
            Ok(ActorMetadata::new(Some(identity.id), Some(identity.name)))
        }
        Actor::Platform => Ok(ActorMetadata::default()),
    }
}

/// Insert a commit with the folder's next sequence number and its changes.
async fn insert_commit(
    tx: &mut dyn PitTransaction,
    folder_id: Uuid,
    env_id: Uuid,
    actor: &Actor,
    actor_metadata: ActorMetadata,
    message: Option<String>,
    changes: Vec<NewCommitChange>,
) -> AppResult<FolderCommit> {
    let next = tx
        .find_latest_commit(folder_id)
        .await?
        .map_or(1, |c| c.commit_id + 1);

    let commit = tx
        .insert_commit(&NewFolderCommit {
            id: Uuid::new_v4(),
            commit_id: next,
            folder_id,
            env_id,
            actor_type: actor.actor_type(),
            actor_metadata,
            message,
        })
        .await?;

    let rows: Vec<FolderCommitChange> = changes
        .into_iter()
        .map(|change| change.into_change(commit.id))
        .collect();
    if !rows.is_empty() {
        tx.insert_commit_changes(&rows).await?;
    }

    Ok(commit)
}

fn deleted_folder_versions(changes: &[NewCommitChange]) -> Vec<Uuid> {
    changes
        .iter()
        .filter(|c| c.change_type.is_delete())
        .filter_map(|c| c.folder_version_id)
        .collect()
}
