//! Folder version entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An immutable snapshot of a folder's attributes at one edit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderVersion {
    /// Unique version identifier.
    pub id: Uuid,
    /// The folder this version belongs to.
    pub folder_id: Uuid,
    /// The environment of the folder.
    pub env_id: Uuid,
    /// Sequential version number.
    pub version: i32,
    /// Folder name at this version.
    pub name: String,
    /// Folder description at this version.
    pub description: Option<String>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
}

impl FolderVersion {
    /// Whether two versions carry the same user-visible attributes.
    pub fn has_same_content(&self, other: &FolderVersion) -> bool {
        self.name == other.name && self.description == other.description
    }

    /// A new version of the same folder carrying this version's attributes.
    pub fn copy_as(&self, version_number: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            folder_id: self.folder_id,
            env_id: self.env_id,
            version: version_number,
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: Utc::now(),
        }
    }
}
