//! Folder tree checkpoint entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An environment-wide snapshot mapping each folder to its latest commit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderTreeCheckpoint {
    /// Unique checkpoint identifier.
    pub id: Uuid,
    /// The environment's latest commit when the snapshot was taken.
    pub folder_commit_id: Uuid,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

/// A `(folder, latest commit)` pair captured by a tree checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderTreeCheckpointResource {
    /// Unique row identifier.
    pub id: Uuid,
    /// Owning tree checkpoint.
    pub folder_tree_checkpoint_id: Uuid,
    /// Captured folder.
    pub folder_id: Uuid,
    /// Latest commit of that folder at snapshot time.
    pub folder_commit_id: Uuid,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}
