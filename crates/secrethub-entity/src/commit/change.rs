//! Commit change entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use secrethub_core::{AppError, AppResult};

/// What a commit did to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "commit_change_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommitChangeType {
    /// The referenced version was added to the folder.
    Add,
    /// The referenced version replaced an earlier version.
    Update,
    /// The referenced version was removed from the folder.
    Delete,
}

impl CommitChangeType {
    /// Return the change type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the change removes the resource from the folder.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for CommitChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted change row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderCommitChange {
    /// Unique change identifier.
    pub id: Uuid,
    /// Owning commit.
    pub folder_commit_id: Uuid,
    /// Change type.
    pub change_type: CommitChangeType,
    /// Referenced secret version.
    pub secret_version_id: Option<Uuid>,
    /// Referenced folder version.
    pub folder_version_id: Option<Uuid>,
    /// When the change was recorded.
    pub created_at: DateTime<Utc>,
}

/// A change to be recorded with a new commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommitChange {
    /// Change type.
    pub change_type: CommitChangeType,
    /// Referenced secret version.
    pub secret_version_id: Option<Uuid>,
    /// Referenced folder version.
    pub folder_version_id: Option<Uuid>,
}

impl NewCommitChange {
    /// A change referencing a secret version.
    pub fn secret(change_type: CommitChangeType, secret_version_id: Uuid) -> Self {
        Self {
            change_type,
            secret_version_id: Some(secret_version_id),
            folder_version_id: None,
        }
    }

    /// A change referencing a folder version.
    pub fn folder(change_type: CommitChangeType, folder_version_id: Uuid) -> Self {
        Self {
            change_type,
            secret_version_id: None,
            folder_version_id: Some(folder_version_id),
        }
    }

    /// Reject changes that do not reference exactly one version.
    pub fn validate(&self) -> AppResult<()> {
        match (self.secret_version_id, self.folder_version_id) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(AppError::bad_request(
                "Commit change must reference either a secret version or a folder version, not both",
            )),
            (None, None) => Err(AppError::bad_request(
                "Commit change must reference a secret version or a folder version",
            )),
        }
    }

    /// Materialize the row under `folder_commit_id`.
    pub fn into_change(self, folder_commit_id: Uuid) -> FolderCommitChange {
        FolderCommitChange {
            id: Uuid::new_v4(),
            folder_commit_id,
            change_type: self.change_type,
            secret_version_id: self.secret_version_id,
            folder_version_id: self.folder_version_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrethub_core::error::ErrorKind;

    #[test]
    fn test_validate_exactly_one_reference() {
        assert!(NewCommitChange::secret(CommitChangeType::Add, Uuid::new_v4())
            .validate()
            .is_ok());
        assert!(NewCommitChange::folder(CommitChangeType::Delete, Uuid::new_v4())
            .validate()
            .is_ok());

        let neither = NewCommitChange {
            change_type: CommitChangeType::Add,
            secret_version_id: None,
            folder_version_id: None,
        };
        assert_eq!(neither.validate().unwrap_err().kind, ErrorKind::BadRequest);

        let both = NewCommitChange {
            change_type: CommitChangeType::Update,
            secret_version_id: Some(Uuid::new_v4()),
            folder_version_id: Some(Uuid::new_v4()),
        };
        assert_eq!(both.validate().unwrap_err().kind, ErrorKind::BadRequest);
    }

    #[test]
    fn test_change_type_serde() {
        let json = serde_json::to_string(&CommitChangeType::Delete).unwrap();
        assert_eq!(json, "\"delete\"");
        assert!(CommitChangeType::Delete.is_delete());
        assert!(!CommitChangeType::Update.is_delete());
    }
}
