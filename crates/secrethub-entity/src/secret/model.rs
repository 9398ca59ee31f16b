//! Live secret entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::version::SecretVersion;

/// A live secret row. Payload fields are ciphertext produced upstream.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Secret {
    /// Unique secret identifier.
    pub id: Uuid,
    /// The folder containing this secret.
    pub folder_id: Uuid,
    /// Secret key (name).
    pub key: String,
    /// Current version number.
    pub version: i32,
    /// Encrypted secret value.
    pub encrypted_value: Option<Vec<u8>>,
    /// Encrypted secret comment.
    pub encrypted_comment: Option<Vec<u8>>,
    /// Whether multiline values are kept verbatim.
    pub skip_multiline_encoding: bool,
    /// Arbitrary key/value metadata.
    pub metadata: Option<serde_json::Value>,
    /// When the secret was created.
    pub created_at: DateTime<Utc>,
    /// When the secret was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Secret {
    /// Build a live row holding the content of `version`.
    pub fn from_version(version: &SecretVersion, folder_id: Uuid, version_number: i32) -> Self {
        let now = Utc::now();
        Self {
            id: version.secret_id,
            folder_id,
            key: version.key.clone(),
            version: version_number,
            encrypted_value: version.encrypted_value.clone(),
            encrypted_comment: version.encrypted_comment.clone(),
            skip_multiline_encoding: version.skip_multiline_encoding,
            metadata: version.metadata.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite this row's content with `version`.
    pub fn apply_version(&mut self, version: &SecretVersion, version_number: i32) {
        self.key = version.key.clone();
        self.version = version_number;
        self.encrypted_value = version.encrypted_value.clone();
        self.encrypted_comment = version.encrypted_comment.clone();
        self.skip_multiline_encoding = version.skip_multiline_encoding;
        self.metadata = version.metadata.clone();
        self.updated_at = Utc::now();
    }
}
