//! Transactional storage seam for the point-in-time engine.
//!
//! Every engine operation runs against a [`PitTransaction`] obtained from a
//! [`PitStore`]. Work becomes visible only through [`PitTransaction::commit`];
//! a transaction dropped without committing is rolled back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use secrethub_core::result::AppResult;
use secrethub_core::types::pagination::{PageRequest, PageResponse};
use secrethub_entity::checkpoint::{
    CheckpointEntry, CheckpointMarker, FolderCheckpoint, FolderCheckpointResource,
    FolderTreeCheckpoint, FolderTreeCheckpointResource,
};
use secrethub_entity::commit::{
    CommitWithChanges, FolderCommit, FolderCommitChange, NewFolderCommit, ResolvedChange,
};
use secrethub_entity::folder::{Folder, FolderVersion};
use secrethub_entity::principal::{Environment, Identity, User};
use secrethub_entity::secret::{Secret, SecretVersion};

pub use memory::MemoryPitStore;
pub use postgres::PgPitStore;

/// Factory for storage transactions.
#[async_trait]
pub trait PitStore: Send + Sync + std::fmt::Debug + 'static {
    /// Open a new transaction.
    async fn begin(&self) -> AppResult<Box<dyn PitTransaction>>;
}

/// All reads and writes the engine performs, scoped to one transaction.
#[async_trait]
pub trait PitTransaction: Send {
    /// Make every write in this transaction durable.
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Mark a point this transaction can return to. `name` must be a plain
    /// SQL identifier.
    async fn savepoint(&mut self, name: &str) -> AppResult<()>;

    /// Discard every write made since the named savepoint. The savepoint
    /// stays in place.
    async fn rollback_to_savepoint(&mut self, name: &str) -> AppResult<()>;

    /// Forget the named savepoint, keeping its writes.
    async fn release_savepoint(&mut self, name: &str) -> AppResult<()>;

    // -- Principals ------------------------------------------------------

    /// Find a user by ID.
    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>>;

    /// Find a machine identity by ID.
    async fn find_identity(&mut self, id: Uuid) -> AppResult<Option<Identity>>;

    /// Find an environment by ID.
    async fn find_environment(&mut self, id: Uuid) -> AppResult<Option<Environment>>;

    // -- Folders ---------------------------------------------------------

    /// Find a live folder by ID.
    async fn find_folder(&mut self, id: Uuid) -> AppResult<Option<Folder>>;

    /// Direct live children of a folder.
    async fn find_folders_by_parent(&mut self, parent_id: Uuid) -> AppResult<Vec<Folder>>;

    /// Every live folder of an environment.
    async fn find_folders_by_env(&mut self, env_id: Uuid) -> AppResult<Vec<Folder>>;

    /// A live folder and all its descendants, parents before children.
    async fn find_folder_subtree(&mut self, root_id: Uuid) -> AppResult<Vec<Folder>>;

    /// Take the folder's row lock until the transaction ends.
    async fn lock_folder(&mut self, id: Uuid) -> AppResult<()>;

    /// Insert a live folder row.
    async fn insert_folder(&mut self, folder: &Folder) -> AppResult<()>;

    /// Overwrite a live folder row.
    async fn update_folder(&mut self, folder: &Folder) -> AppResult<()>;

    /// Delete a live folder with its descendants and their secrets.
    async fn delete_folder(&mut self, id: Uuid) -> AppResult<bool>;

    /// Find a folder version by ID.
    async fn find_folder_version(&mut self, id: Uuid) -> AppResult<Option<FolderVersion>>;

    /// Highest-numbered version of a folder.
    async fn find_latest_folder_version(&mut self, folder_id: Uuid)
    -> AppResult<Option<FolderVersion>>;

    /// Latest versions of the live direct children of a folder.
    async fn find_child_folder_versions(&mut self, parent_id: Uuid)
    -> AppResult<Vec<FolderVersion>>;

    /// Append a folder version.
    async fn insert_folder_version(&mut self, version: &FolderVersion) -> AppResult<()>;

    // -- Secrets ---------------------------------------------------------

    /// Find a live secret by ID.
    async fn find_secret(&mut self, id: Uuid) -> AppResult<Option<Secret>>;

    /// Insert a live secret row.
    async fn insert_secret(&mut self, secret: &Secret) -> AppResult<()>;

    /// Overwrite a live secret row.
    async fn update_secret(&mut self, secret: &Secret) -> AppResult<()>;

    /// Delete a live secret row.
    async fn delete_secret(&mut self, id: Uuid) -> AppResult<bool>;

    /// Find a secret version by ID.
    async fn find_secret_version(&mut self, id: Uuid) -> AppResult<Option<SecretVersion>>;

    /// Highest-numbered version of a secret.
    async fn find_latest_secret_version(&mut self, secret_id: Uuid)
    -> AppResult<Option<SecretVersion>>;

    /// The version of a secret immediately below `version`.
    async fn find_previous_secret_version(
        &mut self,
        secret_id: Uuid,
        version: i32,
    ) -> AppResult<Option<SecretVersion>>;

    /// Latest versions of the live secrets in a folder.
    async fn find_folder_secret_versions(&mut self, folder_id: Uuid)
    -> AppResult<Vec<SecretVersion>>;

    /// Append a secret version.
    async fn insert_secret_version(&mut self, version: &SecretVersion) -> AppResult<()>;

    // -- Commit log ------------------------------------------------------

    /// Find a commit by row ID.
    async fn find_commit(&mut self, id: Uuid) -> AppResult<Option<FolderCommit>>;

    /// The folder's commit with the highest sequence number.
    async fn find_latest_commit(&mut self, folder_id: Uuid) -> AppResult<Option<FolderCommit>>;

    /// The folder's last commit with a sequence number below `commit_id`.
    async fn find_commit_before(
        &mut self,
        folder_id: Uuid,
        commit_id: i64,
    ) -> AppResult<Option<FolderCommit>>;

    /// The folder's last commit at or before a global position.
    async fn find_commit_at_position(
        &mut self,
        folder_id: Uuid,
        position: i64,
    ) -> AppResult<Option<FolderCommit>>;

    /// Commits with sequence in `(after, up_to]`, ascending, with resolved changes.
    async fn find_commits_with_changes(
        &mut self,
        folder_id: Uuid,
        after: i64,
        up_to: i64,
    ) -> AppResult<Vec<CommitWithChanges>>;

    /// Resolved changes of one commit.
    async fn find_commit_changes(&mut self, folder_commit_id: Uuid)
    -> AppResult<Vec<ResolvedChange>>;

    /// Number of the folder's commits with sequence above `after`.
    async fn count_commits_since(&mut self, folder_id: Uuid, after: i64) -> AppResult<i64>;

    /// A page of the folder's commits, newest first.
    async fn list_commits(
        &mut self,
        folder_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<FolderCommit>>;

    /// Insert a commit row. A duplicate `(folder_id, commit_id)` is a conflict.
    async fn insert_commit(&mut self, commit: &NewFolderCommit) -> AppResult<FolderCommit>;

    /// Insert change rows.
    async fn insert_commit_changes(&mut self, changes: &[FolderCommitChange]) -> AppResult<()>;

    /// The environment's most recent commit by position.
    async fn find_latest_env_commit(&mut self, env_id: Uuid) -> AppResult<Option<FolderCommit>>;

    /// Number of environment commits positioned after `after`.
    async fn count_env_commits_since(&mut self, env_id: Uuid, after: i64) -> AppResult<i64>;

    /// Environment commits with position in `(after, up_to]`, ascending.
    async fn find_env_commits_between(
        &mut self,
        env_id: Uuid,
        after: i64,
        up_to: i64,
    ) -> AppResult<Vec<FolderCommit>>;

    /// Latest commit of each listed folder that has one.
    async fn find_latest_commits_for_folders(
        &mut self,
        folder_ids: &[Uuid],
    ) -> AppResult<Vec<FolderCommit>>;

    // -- Folder checkpoints ----------------------------------------------

    /// The folder's checkpoint with the highest anchor sequence, optionally
    /// bounded by `up_to`.
    async fn find_nearest_checkpoint(
        &mut self,
        folder_id: Uuid,
        up_to: Option<i64>,
    ) -> AppResult<Option<CheckpointMarker>>;

    /// All checkpoints of a folder, newest first.
    async fn list_checkpoints(&mut self, folder_id: Uuid) -> AppResult<Vec<CheckpointMarker>>;

    /// Insert a checkpoint row.
    async fn insert_checkpoint(&mut self, checkpoint: &FolderCheckpoint) -> AppResult<()>;

    /// Insert checkpoint resource rows.
    async fn insert_checkpoint_resources(
        &mut self,
        resources: &[FolderCheckpointResource],
    ) -> AppResult<()>;

    /// Resolved resource set of a checkpoint.
    async fn find_checkpoint_resources(
        &mut self,
        checkpoint_id: Uuid,
    ) -> AppResult<Vec<CheckpointEntry>>;

    // -- Tree checkpoints ------------------------------------------------

    /// The environment's tree checkpoint with the highest anchor position,
    /// optionally bounded by `up_to`.
    async fn find_nearest_tree_checkpoint(
        &mut self,
        env_id: Uuid,
        up_to: Option<i64>,
    ) -> AppResult<Option<CheckpointMarker>>;

    /// Insert a tree checkpoint row.
    async fn insert_tree_checkpoint(&mut self, checkpoint: &FolderTreeCheckpoint) -> AppResult<()>;

    /// Insert tree checkpoint resource rows.
    async fn insert_tree_checkpoint_resources(
        &mut self,
        resources: &[FolderTreeCheckpointResource],
    ) -> AppResult<()>;

    /// Commits captured by a tree checkpoint.
    async fn find_tree_checkpoint_commits(
        &mut self,
        tree_checkpoint_id: Uuid,
    ) -> AppResult<Vec<FolderCommit>>;
}
