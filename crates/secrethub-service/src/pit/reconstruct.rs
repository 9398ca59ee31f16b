//! Rebuilding past folder states from checkpoints and the commit log.

use tracing::debug;
use uuid::Uuid;

use secrethub_core::{AppError, AppResult};
use secrethub_database::PitTransaction;
use secrethub_entity::commit::FolderCommit;
use secrethub_entity::resource::ResourceKind;

use super::state::{DiffChangeType, FolderState, ResourceChange, all_created, diff_states};

/// A reconstructed folder state and how it was obtained.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Folder the state belongs to.
    pub folder_id: Uuid,
    /// Sequence number the state was rebuilt at.
    pub commit_id: i64,
    /// The resource set.
    pub state: FolderState,
    /// Checkpoint used as the replay base.
    pub checkpoint_id: Option<Uuid>,
    /// Number of commits replayed on top of the base.
    pub replayed_commits: usize,
}

/// Rebuild a folder's resource set as of sequence number `up_to`.
///
/// Starts from the nearest checkpoint at or below `up_to`, or from an empty
/// state when there is none, and replays the commits after it.
pub async fn reconstruct_folder_state(
    tx: &mut dyn PitTransaction,
    folder_id: Uuid,
    up_to: i64,
) -> AppResult<Reconstruction> {
    let marker = tx.find_nearest_checkpoint(folder_id, Some(up_to)).await?;

    let (mut state, after, checkpoint_id) = match marker {
        Some(marker) => {
            let resources = tx.find_checkpoint_resources(marker.checkpoint_id).await?;
            (
                FolderState::from_checkpoint(resources),
                marker.commit_id,
                Some(marker.checkpoint_id),
            )
        }
        None => (FolderState::new(), 0, None),
    };

    let commits = tx.find_commits_with_changes(folder_id, after, up_to).await?;
    let replayed_commits = state.replay(&commits);

    debug!(
        folder_id = %folder_id,
        commit_id = up_to,
        checkpoint_id = ?checkpoint_id,
        replayed = replayed_commits,
        resources = state.len(),
        "Folder state reconstructed"
    );

    Ok(Reconstruction {
        folder_id,
        commit_id: up_to,
        state,
        checkpoint_id,
        replayed_commits,
    })
}

/// Changes that take the folder from `current` (or nothing) to `target`.
///
/// Both commits must belong to the same folder. Updates between versions
/// with identical content are dropped.
pub async fn compare_commits(
    tx: &mut dyn PitTransaction,
    target: &FolderCommit,
    current: Option<&FolderCommit>,
) -> AppResult<Vec<ResourceChange>> {
    let target_state = reconstruct_folder_state(tx, target.folder_id, target.commit_id)
        .await?
        .state;

    let Some(current) = current else {
        return Ok(all_created(&target_state));
    };

    if current.folder_id != target.folder_id {
        return Err(AppError::bad_request(format!(
            "Commits {} and {} belong to different folders",
            target.id, current.id
        )));
    }

    let current_state = reconstruct_folder_state(tx, current.folder_id, current.commit_id)
        .await?
        .state;

    let mut changes = Vec::new();
    for change in diff_states(&target_state, &current_state) {
        if change.change_type == DiffChangeType::Update && same_content(tx, &change).await? {
            continue;
        }
        changes.push(change);
    }
    Ok(changes)
}

/// Look up a commit by ID or fail with `NotFound`.
pub async fn require_commit(tx: &mut dyn PitTransaction, id: Uuid) -> AppResult<FolderCommit> {
    tx.find_commit(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Folder commit {id} not found")))
}

async fn same_content(tx: &mut dyn PitTransaction, change: &ResourceChange) -> AppResult<bool> {
    let Some(from_version_id) = change.from_version_id else {
        return Ok(false);
    };

    match change.kind {
        ResourceKind::Secret => {
            let target = tx.find_secret_version(change.version_id).await?;
            let held = tx.find_secret_version(from_version_id).await?;
            Ok(matches!((target, held), (Some(t), Some(h)) if t.has_same_content(&h)))
        }
        ResourceKind::Folder => {
            let target = tx.find_folder_version(change.version_id).await?;
            let held = tx.find_folder_version(from_version_id).await?;
            Ok(matches!((target, held), (Some(t), Some(h)) if t.has_same_content(&h)))
        }
    }
}
