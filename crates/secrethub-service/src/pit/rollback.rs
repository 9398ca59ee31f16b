//! Applying diffs to live folders: rollback, deep rollback and revert.
//!
//! Every apply mutates the live secret and folder rows and then records the
//! mutation as a new commit, so a rollback can itself be rolled back. All
//! work for one request runs in a single transaction.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use secrethub_cache::CacheManager;
use secrethub_core::config::PitConfig;
use secrethub_core::{AppError, AppResult};
use secrethub_database::{PitStore, PitTransaction};
use secrethub_entity::commit::{Actor, CommitChangeType, FolderCommit, NewCommitChange};
use secrethub_entity::folder::{Folder, FolderVersion};
use secrethub_entity::resource::ResourceKind;
use secrethub_entity::secret::Secret;

use super::checkpoint::resolve_folder_commits_at;
use super::commit::{CommitRequest, CommitService};
use super::reconstruct::{compare_commits, reconstruct_folder_state, require_commit};
use super::scheduler::{TreeCheckpointScheduler, schedule_quietly};
use super::state::{DiffChangeType, ResourceChange};

const DEFAULT_APPLY_MESSAGE: &str = "Rolled back folder state";
const DEFAULT_DEEP_ROLLBACK_MESSAGE: &str = "Deep rollback";

/// Apply a list of differences to one folder.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// Changes to make, usually from `compare_folder_states`.
    pub differences: Vec<ResourceChange>,
    /// Who is rolling back.
    pub actor: Actor,
    /// Message of the resulting commit.
    pub message: Option<String>,
    /// Folder to change.
    pub folder_id: Uuid,
    /// Project whose secret cache is invalidated afterwards.
    pub project_id: Uuid,
    /// Recreate the contents of folders brought back by a create.
    pub reconstruct_new_folders: bool,
    /// Position whose state recreated folders are restored to.
    pub reconstruct_up_to: Option<i64>,
}

/// What an apply did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyOutcome {
    /// Secret changes applied.
    pub secret_changes: usize,
    /// Folder changes applied.
    pub folder_changes: usize,
    /// All changes applied.
    pub total_changes: usize,
    /// The commit recording the apply.
    pub commit: Option<FolderCommit>,
}

/// Roll a folder and its descendants back to a commit.
#[derive(Debug, Clone)]
pub struct DeepRollbackRequest {
    /// Commit of the top folder to roll back to.
    pub target_commit_id: Uuid,
    /// Environment the folder lives in.
    pub env_id: Uuid,
    /// Who is rolling back.
    pub actor: Actor,
    /// Project whose secret cache is invalidated afterwards.
    pub project_id: Uuid,
    /// Message of the resulting commits.
    pub message: Option<String>,
}

/// One folder's part of a deep rollback.
#[derive(Debug, Clone, Serialize)]
pub struct FolderRollback {
    pub folder_id: Uuid,
    pub folder_name: String,
    pub outcome: ApplyOutcome,
}

/// Result of a deep rollback.
#[derive(Debug, Clone, Serialize)]
pub struct DeepRollbackOutcome {
    /// The commit rolled back to.
    pub target_commit_id: Uuid,
    /// Per-folder results, parents before children.
    pub folders: Vec<FolderRollback>,
}

impl DeepRollbackOutcome {
    /// Sum of applied changes across all folders.
    pub fn total_changes(&self) -> usize {
        self.folders.iter().map(|f| f.outcome.total_changes).sum()
    }
}

/// Changes a deep rollback would make to one folder.
#[derive(Debug, Clone, Serialize)]
pub struct FolderDiff {
    pub folder_id: Uuid,
    pub folder_name: String,
    /// Set for folders that no longer exist and would be recreated.
    pub recreated: bool,
    pub changes: Vec<ResourceChange>,
}

/// Result of reverting one commit.
#[derive(Debug, Clone, Serialize)]
pub struct RevertOutcome {
    /// The reverted commit.
    pub reverted_commit_id: Uuid,
    /// Number of changes undone.
    pub changes_reverted: usize,
    /// The commit recording the revert, if anything was left to undo.
    pub commit: Option<FolderCommit>,
}

/// A folder scheduled for rollback together with its diff.
struct PlannedFolder {
    folder: Folder,
    target: FolderCommit,
    changes: Vec<ResourceChange>,
}

/// Mutates live folders to match past states.
#[derive(Debug, Clone)]
pub struct RollbackService {
    store: Arc<dyn PitStore>,
    commits: Arc<CommitService>,
    cache: Arc<CacheManager>,
    scheduler: Arc<dyn TreeCheckpointScheduler>,
    config: PitConfig,
}

impl RollbackService {
    /// Create a new rollback service.
    pub fn new(
        store: Arc<dyn PitStore>,
        commits: Arc<CommitService>,
        cache: Arc<CacheManager>,
        scheduler: Arc<dyn TreeCheckpointScheduler>,
        config: PitConfig,
    ) -> Self {
        Self {
            store,
            commits,
            cache,
            scheduler,
            config,
        }
    }

    /// Differences between two commits of the same folder.
    ///
    /// Without `current_commit_id` every resource of the target state is
    /// reported as a create.
    pub async fn compare_folder_states(
        &self,
        target_commit_id: Uuid,
        current_commit_id: Option<Uuid>,
    ) -> AppResult<Vec<ResourceChange>> {
        let mut tx = self.store.begin().await?;
        let target = require_commit(tx.as_mut(), target_commit_id).await?;
        let current = match current_commit_id {
            Some(id) => Some(require_commit(tx.as_mut(), id).await?),
            None => None,
        };
        compare_commits(tx.as_mut(), &target, current.as_ref()).await
    }

    /// Apply differences to a folder and record them as a commit.
    pub async fn apply_folder_state_differences(
        &self,
        request: ApplyRequest,
    ) -> AppResult<ApplyOutcome> {
        let mut tx = self.store.begin().await?;
        let mut path = vec![request.folder_id];
        let outcome = self.apply_in(tx.as_mut(), &request, 0, &mut path).await?;
        tx.commit().await?;

        self.after_apply(request.project_id, outcome.commit.as_ref().map(|c| c.env_id))
            .await;

        info!(
            folder_id = %request.folder_id,
            secret_changes = outcome.secret_changes,
            folder_changes = outcome.folder_changes,
            "Folder state differences applied"
        );
        Ok(outcome)
    }

    /// Roll a folder and every folder below it back to a commit, atomically.
    ///
    /// Each folder that has history at the target point receives a new
    /// commit, even when it is already in the target state.
    pub async fn deep_rollback_folder(
        &self,
        request: DeepRollbackRequest,
    ) -> AppResult<DeepRollbackOutcome> {
        let mut tx = self.store.begin().await?;
        let target = self
            .require_env_commit(tx.as_mut(), request.target_commit_id, request.env_id)
            .await?;
        let plan = self.plan_deep_rollback(tx.as_mut(), &target).await?;

        let message = request
            .message
            .clone()
            .unwrap_or_else(|| DEFAULT_DEEP_ROLLBACK_MESSAGE.to_string());
        let mut folders = Vec::with_capacity(plan.len());

        for planned in plan {
            let apply = ApplyRequest {
                differences: planned.changes,
                actor: request.actor,
                message: Some(message.clone()),
                folder_id: planned.folder.id,
                project_id: request.project_id,
                reconstruct_new_folders: true,
                reconstruct_up_to: Some(target.position),
            };
            let mut path = vec![planned.folder.id];
            let outcome = self.apply_in(tx.as_mut(), &apply, 0, &mut path).await?;
            debug!(
                folder_id = %planned.folder.id,
                target_commit_id = planned.target.commit_id,
                changes = outcome.total_changes,
                "Folder rolled back"
            );
            folders.push(FolderRollback {
                folder_id: planned.folder.id,
                folder_name: planned.folder.name,
                outcome,
            });
        }

        tx.commit().await?;
        self.after_apply(request.project_id, Some(request.env_id)).await;

        let outcome = DeepRollbackOutcome {
            target_commit_id: target.id,
            folders,
        };
        info!(
            target_commit_id = %target.id,
            folder_id = %target.folder_id,
            folders = outcome.folders.len(),
            total_changes = outcome.total_changes(),
            "Deep rollback completed"
        );
        Ok(outcome)
    }

    /// What [`deep_rollback_folder`](Self::deep_rollback_folder) would
    /// change, without changing anything.
    pub async fn deep_compare_folder(
        &self,
        target_commit_id: Uuid,
        env_id: Uuid,
    ) -> AppResult<Vec<FolderDiff>> {
        let mut tx = self.store.begin().await?;
        let target = self
            .require_env_commit(tx.as_mut(), target_commit_id, env_id)
            .await?;
        let plan = self.plan_deep_rollback(tx.as_mut(), &target).await?;

        let mut diffs = Vec::new();
        for planned in plan {
            let recreated: Vec<(Uuid, String)> = recreated_folders(&planned.changes);
            if !planned.changes.is_empty() {
                diffs.push(FolderDiff {
                    folder_id: planned.folder.id,
                    folder_name: planned.folder.name.clone(),
                    recreated: false,
                    changes: planned.changes,
                });
            }
            let mut path = vec![planned.folder.id];
            for (folder_id, name) in recreated {
                self.preview_recreated(
                    tx.as_mut(),
                    folder_id,
                    name,
                    target.position,
                    1,
                    &mut path,
                    &mut diffs,
                )
                .await?;
            }
        }
        Ok(diffs)
    }

    /// Undo the changes one commit made, as far as they still hold.
    pub async fn revert_commit_changes(
        &self,
        folder_commit_id: Uuid,
        actor: Actor,
        project_id: Uuid,
        message: Option<String>,
    ) -> AppResult<RevertOutcome> {
        let mut tx = self.store.begin().await?;
        let commit = require_commit(tx.as_mut(), folder_commit_id).await?;
        let previous = tx
            .find_commit_before(commit.folder_id, commit.commit_id)
            .await?
            .ok_or_else(|| AppError::bad_request("Cannot revert the first commit"))?;

        let inverse = compare_commits(tx.as_mut(), &previous, Some(&commit)).await?;

        let latest = tx
            .find_latest_commit(commit.folder_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Folder {} has no commits", commit.folder_id))
            })?;
        let current = reconstruct_folder_state(tx.as_mut(), commit.folder_id, latest.commit_id)
            .await?
            .state;

        let mut differences = Vec::with_capacity(inverse.len());
        for mut change in inverse {
            let held = current.get(change.kind, change.resource_id);
            match (change.change_type, held) {
                (DiffChangeType::Create, None) => differences.push(change),
                (DiffChangeType::Delete, Some(held)) => {
                    change.version_id = held.resource.version_id;
                    change.version = held.resource.version;
                    differences.push(change);
                }
                (DiffChangeType::Update, Some(held))
                    if held.resource.version_id != change.version_id =>
                {
                    change.from_version_id = Some(held.resource.version_id);
                    change.from_version = Some(held.resource.version);
                    differences.push(change);
                }
                _ => debug!(
                    resource_id = %change.resource_id,
                    change_type = %change.change_type,
                    "Change already superseded, not reverting"
                ),
            }
        }

        if differences.is_empty() {
            info!(folder_commit_id = %commit.id, "Nothing left to revert");
            return Ok(RevertOutcome {
                reverted_commit_id: commit.id,
                changes_reverted: 0,
                commit: None,
            });
        }

        let request = ApplyRequest {
            differences,
            actor,
            message: Some(
                message.unwrap_or_else(|| format!("Reverted changes from commit {}", commit.id)),
            ),
            folder_id: commit.folder_id,
            project_id,
            reconstruct_new_folders: true,
            reconstruct_up_to: Some(previous.position),
        };
        let mut path = vec![commit.folder_id];
        let outcome = self.apply_in(tx.as_mut(), &request, 0, &mut path).await?;
        tx.commit().await?;

        self.after_apply(project_id, Some(commit.env_id)).await;

        info!(
            folder_commit_id = %commit.id,
            changes = outcome.total_changes,
            "Commit reverted"
        );
        Ok(RevertOutcome {
            reverted_commit_id: commit.id,
            changes_reverted: outcome.total_changes,
            commit: outcome.commit,
        })
    }

    async fn require_env_commit(
        &self,
        tx: &mut dyn PitTransaction,
        commit_id: Uuid,
        env_id: Uuid,
    ) -> AppResult<FolderCommit> {
        let commit = require_commit(tx, commit_id).await?;
        if commit.env_id != env_id {
            return Err(AppError::bad_request(format!(
                "Commit {commit_id} does not belong to environment {env_id}"
            )));
        }
        Ok(commit)
    }

    /// Diff every folder of the target's subtree against its state at the
    /// target position. Folders removed by an ancestor's diff are skipped
    /// together with their descendants.
    async fn plan_deep_rollback(
        &self,
        tx: &mut dyn PitTransaction,
        target: &FolderCommit,
    ) -> AppResult<Vec<PlannedFolder>> {
        let subtree = tx.find_folder_subtree(target.folder_id).await?;
        if subtree.is_empty() {
            return Err(AppError::not_found(format!("Folder {} not found", target.folder_id)));
        }

        let mut at_target = resolve_folder_commits_at(tx, target.env_id, target.position).await?;
        at_target.insert(target.folder_id, target.clone());

        let ids: Vec<Uuid> = subtree.iter().map(|f| f.id).collect();
        let latest: BTreeMap<Uuid, FolderCommit> = tx
            .find_latest_commits_for_folders(&ids)
            .await?
            .into_iter()
            .map(|c| (c.folder_id, c))
            .collect();

        let mut skipped: HashSet<Uuid> = HashSet::new();
        let mut plan = Vec::new();

        for folder in subtree {
            let parent_skipped = folder.parent_id.is_some_and(|p| skipped.contains(&p));
            if parent_skipped || skipped.contains(&folder.id) {
                debug!(folder_id = %folder.id, "Folder removed by rollback, skipping");
                skipped.insert(folder.id);
                continue;
            }

            let Some(folder_target) = at_target.remove(&folder.id) else {
                debug!(folder_id = %folder.id, "Folder has no history at target, skipping");
                continue;
            };

            let changes = compare_commits(tx, &folder_target, latest.get(&folder.id)).await?;
            for change in &changes {
                if change.is_folder() && change.change_type == DiffChangeType::Delete {
                    skipped.insert(change.resource_id);
                }
            }

            plan.push(PlannedFolder {
                folder,
                target: folder_target,
                changes,
            });
        }

        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn preview_recreated<'a>(
        &'a self,
        tx: &'a mut dyn PitTransaction,
        folder_id: Uuid,
        folder_name: String,
        position: i64,
        depth: usize,
        path: &'a mut Vec<Uuid>,
        diffs: &'a mut Vec<FolderDiff>,
    ) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            self.guard_recursion(folder_id, depth, path)?;
            let Some(commit) = tx.find_commit_at_position(folder_id, position).await? else {
                return Ok(());
            };
            let changes = compare_commits(tx, &commit, None).await?;
            let nested = recreated_folders(&changes);
            if !changes.is_empty() {
                diffs.push(FolderDiff {
                    folder_id,
                    folder_name,
                    recreated: true,
                    changes,
                });
            }

            path.push(folder_id);
            for (child_id, child_name) in nested {
                self.preview_recreated(tx, child_id, child_name, position, depth + 1, path, diffs)
                    .await?;
            }
            path.pop();
            Ok(())
        })
    }

    fn guard_recursion(&self, folder_id: Uuid, depth: usize, path: &[Uuid]) -> AppResult<()> {
        if path.contains(&folder_id) {
            return Err(AppError::data_integrity(format!(
                "Folder {folder_id} appears twice in its own ancestry"
            )));
        }
        if depth > self.config.max_folder_depth {
            return Err(AppError::data_integrity(format!(
                "Folder recreation exceeds maximum depth of {}",
                self.config.max_folder_depth
            )));
        }
        Ok(())
    }

    /// Apply a request inside `tx`. `path` holds this folder and the
    /// folders being recreated above it.
    fn apply_in<'a>(
        &'a self,
        tx: &'a mut dyn PitTransaction,
        request: &'a ApplyRequest,
        depth: usize,
        path: &'a mut Vec<Uuid>,
    ) -> BoxFuture<'a, AppResult<ApplyOutcome>> {
        Box::pin(async move {
            if tx.find_folder(request.folder_id).await?.is_none() {
                return Err(AppError::not_found(format!("Folder {} not found", request.folder_id)));
            }

            let mut changes = Vec::with_capacity(request.differences.len());
            let mut secret_changes = 0;
            let mut folder_changes = 0;

            for diff in request.differences.iter().filter(|d| d.is_secret()) {
                changes.push(self.apply_secret_change(tx, request, diff).await?);
                secret_changes += 1;
            }

            for diff in request.differences.iter().filter(|d| d.is_folder()) {
                let recreated = self.apply_folder_change(tx, request, diff, &mut changes).await?;
                folder_changes += 1;

                if let (Some(folder), true, Some(up_to)) =
                    (recreated, request.reconstruct_new_folders, request.reconstruct_up_to)
                {
                    self.guard_recursion(folder.id, depth + 1, path)?;
                    let Some(commit) = tx.find_commit_at_position(folder.id, up_to).await? else {
                        continue;
                    };
                    let differences = compare_commits(tx, &commit, None).await?;
                    if differences.is_empty() {
                        continue;
                    }
                    let nested = ApplyRequest {
                        differences,
                        folder_id: folder.id,
                        ..request.clone()
                    };
                    path.push(folder.id);
                    self.apply_in(tx, &nested, depth + 1, path).await?;
                    path.pop();
                }
            }

            let commit = self
                .commits
                .create_commit_in(
                    tx,
                    CommitRequest {
                        actor: request.actor,
                        message: Some(
                            request
                                .message
                                .clone()
                                .unwrap_or_else(|| DEFAULT_APPLY_MESSAGE.to_string()),
                        ),
                        folder_id: request.folder_id,
                        changes,
                        omit_ignore_filter: true,
                    },
                )
                .await?;

            Ok(ApplyOutcome {
                secret_changes,
                folder_changes,
                total_changes: secret_changes + folder_changes,
                commit,
            })
        })
    }

    async fn apply_secret_change(
        &self,
        tx: &mut dyn PitTransaction,
        request: &ApplyRequest,
        diff: &ResourceChange,
    ) -> AppResult<NewCommitChange> {
        if diff.change_type == DiffChangeType::Delete {
            tx.delete_secret(diff.resource_id).await?;
            return Ok(NewCommitChange::secret(CommitChangeType::Delete, diff.version_id));
        }

        let version = tx
            .find_secret_version(diff.version_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Secret version {} not found", diff.version_id)))?;
        let next = tx
            .find_latest_secret_version(version.secret_id)
            .await?
            .map_or(1, |v| v.version + 1);
        let restored = version.copy_as(request.folder_id, next, &request.actor);
        tx.insert_secret_version(&restored).await?;

        match tx.find_secret(version.secret_id).await? {
            Some(mut secret) => {
                secret.folder_id = request.folder_id;
                secret.apply_version(&restored, next);
                tx.update_secret(&secret).await?;
            }
            None => {
                tx.insert_secret(&Secret::from_version(&restored, request.folder_id, next))
                    .await?;
            }
        }

        let change_type = match diff.change_type {
            DiffChangeType::Create => CommitChangeType::Add,
            _ => CommitChangeType::Update,
        };
        Ok(NewCommitChange::secret(change_type, restored.id))
    }

    /// Apply one folder diff, returning the folder if it had to be created.
    async fn apply_folder_change(
        &self,
        tx: &mut dyn PitTransaction,
        request: &ApplyRequest,
        diff: &ResourceChange,
        changes: &mut Vec<NewCommitChange>,
    ) -> AppResult<Option<Folder>> {
        if diff.change_type == DiffChangeType::Delete {
            if !tx.delete_folder(diff.resource_id).await? {
                warn!(folder_id = %diff.resource_id, "Folder to delete was already gone");
            }
            changes.push(NewCommitChange::folder(CommitChangeType::Delete, diff.version_id));
            return Ok(None);
        }

        let version = tx
            .find_folder_version(diff.version_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder version {} not found", diff.version_id)))?;
        let restored = self.next_folder_version(tx, &version).await?;

        let created = match tx.find_folder(version.folder_id).await? {
            Some(mut folder) => {
                folder.parent_id = Some(request.folder_id);
                folder.name = restored.name.clone();
                folder.description = restored.description.clone();
                folder.version = restored.version;
                folder.updated_at = restored.created_at;
                tx.update_folder(&folder).await?;
                None
            }
            None => {
                let folder = Folder::from_version(&restored, request.folder_id, restored.version);
                tx.insert_folder(&folder).await?;
                Some(folder)
            }
        };

        let change_type = match diff.change_type {
            DiffChangeType::Create => CommitChangeType::Add,
            _ => CommitChangeType::Update,
        };
        changes.push(NewCommitChange::folder(change_type, restored.id));
        Ok(created)
    }

    async fn next_folder_version(
        &self,
        tx: &mut dyn PitTransaction,
        version: &FolderVersion,
    ) -> AppResult<FolderVersion> {
        let next = tx
            .find_latest_folder_version(version.folder_id)
            .await?
            .map_or(1, |v| v.version + 1);
        let restored = version.copy_as(next);
        tx.insert_folder_version(&restored).await?;
        Ok(restored)
    }

    async fn after_apply(&self, project_id: Uuid, env_id: Option<Uuid>) {
        match self.cache.invalidate_project_secrets(project_id).await {
            Ok(removed) => debug!(project_id = %project_id, removed, "Secret cache invalidated"),
            Err(e) => warn!(project_id = %project_id, error = %e, "Failed to invalidate secret cache"),
        }
        if let Some(env_id) = env_id {
            schedule_quietly(self.scheduler.as_ref(), env_id).await;
        }
    }
}

fn recreated_folders(changes: &[ResourceChange]) -> Vec<(Uuid, String)> {
    changes
        .iter()
        .filter(|c| c.kind == ResourceKind::Folder && c.change_type == DiffChangeType::Create)
        .map(|c| (c.resource_id, c.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: ResourceKind, change_type: DiffChangeType) -> ResourceChange {
        ResourceChange {
            kind,
            resource_id: Uuid::new_v4(),
            change_type,
            version_id: Uuid::new_v4(),
            commit_id: 1,
            name: "app".into(),
            version: 1,
            from_version_id: None,
            from_version: None,
        }
    }

    #[test]
    fn test_recreated_folders_picks_folder_creates() {
        let create = change(ResourceKind::Folder, DiffChangeType::Create);
        let changes = vec![
            create.clone(),
            change(ResourceKind::Folder, DiffChangeType::Delete),
            change(ResourceKind::Secret, DiffChangeType::Create),
        ];
        assert_eq!(recreated_folders(&changes), vec![(create.resource_id, create.name)]);
    }

    #[test]
    fn test_deep_rollback_total_changes() {
        let outcome = DeepRollbackOutcome {
            target_commit_id: Uuid::new_v4(),
            folders: vec![
                FolderRollback {
                    folder_id: Uuid::new_v4(),
                    folder_name: "root".into(),
                    outcome: ApplyOutcome {
                        total_changes: 2,
                        ..Default::default()
                    },
                },
                FolderRollback {
                    folder_id: Uuid::new_v4(),
                    folder_name: "api".into(),
                    outcome: ApplyOutcome {
                        total_changes: 1,
                        ..Default::default()
                    },
                },
            ],
        };
        assert_eq!(outcome.total_changes(), 3);
    }
}
