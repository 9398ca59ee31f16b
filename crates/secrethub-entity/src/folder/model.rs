//! Folder entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::version::FolderVersion;

/// A folder in an environment's secret tree.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Folder {
    /// Unique folder identifier.
    pub id: Uuid,
    /// The environment this folder belongs to.
    pub env_id: Uuid,
    /// Parent folder ID (null for the environment root).
    pub parent_id: Option<Uuid>,
    /// Folder name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Current version number.
    pub version: i32,
    /// Reserved folders are internal and excluded from tree checkpoints.
    pub is_reserved: bool,
    /// When the folder was created.
    pub created_at: DateTime<Utc>,
    /// When the folder was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    /// Check if this is a root folder (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Build a live folder row from a historical version, placed under `parent_id`.
    pub fn from_version(version: &FolderVersion, parent_id: Uuid, version_number: i32) -> Self {
        let now = Utc::now();
        Self {
            id: version.folder_id,
            env_id: version.env_id,
            parent_id: Some(parent_id),
            name: version.name.clone(),
            description: version.description.clone(),
            version: version_number,
            is_reserved: false,
            created_at: now,
            updated_at: now,
        }
    }
}
