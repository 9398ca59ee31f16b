//! Folder checkpoint entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::resource::ResourceVersion;

/// A materialized snapshot of one folder's state at one commit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderCheckpoint {
    /// Unique checkpoint identifier.
    pub id: Uuid,
    /// The commit whose post-state this checkpoint captures.
    pub folder_commit_id: Uuid,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

/// One resource version captured by a folder checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderCheckpointResource {
    /// Unique row identifier.
    pub id: Uuid,
    /// Owning checkpoint.
    pub folder_checkpoint_id: Uuid,
    /// Captured secret version.
    pub secret_version_id: Option<Uuid>,
    /// Captured child folder version.
    pub folder_version_id: Option<Uuid>,
    /// Sequence number of the commit the captured version came from.
    pub commit_id: i64,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// A checkpoint resource resolved to its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// The captured version.
    pub resource: ResourceVersion,
    /// Sequence number of the commit the version came from.
    pub commit_id: i64,
}

/// A checkpoint located relative to the commit log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckpointMarker {
    /// Checkpoint ID (folder or tree checkpoint).
    pub checkpoint_id: Uuid,
    /// Commit the checkpoint is anchored to.
    pub folder_commit_id: Uuid,
    /// Per-folder sequence of the anchor commit.
    pub commit_id: i64,
    /// Global position of the anchor commit.
    pub position: i64,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}
