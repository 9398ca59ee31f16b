//! Versioned resource references shared by commits, checkpoints and diffs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The two kinds of resource a folder holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A secret directly in the folder.
    Secret,
    /// A direct child folder.
    Folder,
}

impl ResourceKind {
    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::Folder => "folder",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pointer to one specific version of a secret or child folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVersion {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Secret ID or folder ID.
    pub resource_id: Uuid,
    /// Version row ID.
    pub version_id: Uuid,
    /// Secret key or folder name at this version.
    pub name: String,
    /// Version number.
    pub version: i32,
}

impl ResourceVersion {
    /// A secret version reference.
    pub fn secret(resource_id: Uuid, version_id: Uuid, name: impl Into<String>, version: i32) -> Self {
        Self {
            kind: ResourceKind::Secret,
            resource_id,
            version_id,
            name: name.into(),
            version,
        }
    }

    /// A folder version reference.
    pub fn folder(resource_id: Uuid, version_id: Uuid, name: impl Into<String>, version: i32) -> Self {
        Self {
            kind: ResourceKind::Folder,
            resource_id,
            version_id,
            name: name.into(),
            version,
        }
    }

    /// The `(kind, id)` identity of the referenced resource.
    pub fn key(&self) -> (ResourceKind, Uuid) {
        (self.kind, self.resource_id)
    }
}

impl From<&crate::secret::SecretVersion> for ResourceVersion {
    fn from(version: &crate::secret::SecretVersion) -> Self {
        Self::secret(version.secret_id, version.id, version.key.clone(), version.version)
    }
}

impl From<&crate::folder::FolderVersion> for ResourceVersion {
    fn from(version: &crate::folder::FolderVersion) -> Self {
        Self::folder(version.folder_id, version.id, version.name.clone(), version.version)
    }
}
