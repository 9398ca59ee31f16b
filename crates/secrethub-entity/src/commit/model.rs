//! Folder commit entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::actor::{ActorMetadata, ActorType};
use super::change::CommitChangeType;
use crate::resource::ResourceVersion;

/// One atomic change-set to a single folder.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderCommit {
    /// Unique commit identifier.
    pub id: Uuid,
    /// Per-folder sequence number, strictly increasing from 1.
    pub commit_id: i64,
    /// Global insertion position, used to order commits across folders.
    pub position: i64,
    /// The folder this commit belongs to.
    pub folder_id: Uuid,
    /// Environment of the folder.
    pub env_id: Uuid,
    /// Kind of actor that authored the commit.
    pub actor_type: ActorType,
    /// Denormalized actor details (JSON).
    pub actor_metadata: serde_json::Value,
    /// Commit message.
    pub message: Option<String>,
    /// When the commit was created.
    pub created_at: DateTime<Utc>,
}

impl FolderCommit {
    /// Decode the stored actor metadata.
    pub fn actor(&self) -> ActorMetadata {
        serde_json::from_value(self.actor_metadata.clone()).unwrap_or_default()
    }

    /// Resolved actor display name, if one was recorded.
    pub fn actor_name(&self) -> Option<String> {
        self.actor().name
    }
}

/// Data required to insert a commit row. The store assigns `position`
/// and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFolderCommit {
    /// Row ID.
    pub id: Uuid,
    /// Per-folder sequence number.
    pub commit_id: i64,
    /// The folder this commit belongs to.
    pub folder_id: Uuid,
    /// Environment of the folder.
    pub env_id: Uuid,
    /// Kind of actor that authored the commit.
    pub actor_type: ActorType,
    /// Denormalized actor details.
    pub actor_metadata: ActorMetadata,
    /// Commit message.
    pub message: Option<String>,
}

/// A commit change joined to the version it references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedChange {
    /// Change type.
    pub change_type: CommitChangeType,
    /// The referenced resource version.
    pub resource: ResourceVersion,
}

/// A commit together with its resolved changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitWithChanges {
    /// The commit row.
    pub commit: FolderCommit,
    /// Changes in insertion order.
    pub changes: Vec<ResolvedChange>,
}
