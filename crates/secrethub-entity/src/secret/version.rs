//! Secret version entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::commit::{Actor, ActorType};

/// An immutable snapshot of a secret's content at one edit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecretVersion {
    /// Unique version identifier.
    pub id: Uuid,
    /// The secret this version belongs to.
    pub secret_id: Uuid,
    /// Folder the secret lived in when the version was written.
    pub folder_id: Uuid,
    /// Environment of the folder.
    pub env_id: Uuid,
    /// Sequential version number.
    pub version: i32,
    /// Secret key at this version.
    pub key: String,
    /// Encrypted secret value.
    pub encrypted_value: Option<Vec<u8>>,
    /// Encrypted secret comment.
    pub encrypted_comment: Option<Vec<u8>>,
    /// Whether multiline values are kept verbatim.
    pub skip_multiline_encoding: bool,
    /// Arbitrary key/value metadata.
    pub metadata: Option<serde_json::Value>,
    /// Kind of actor that produced this version.
    pub actor_type: Option<ActorType>,
    /// User that produced this version.
    pub user_actor_id: Option<Uuid>,
    /// Machine identity that produced this version.
    pub identity_actor_id: Option<Uuid>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
}

impl SecretVersion {
    /// Whether two versions carry identical stored content.
    ///
    /// Payloads are compared as ciphertext; equal plaintext encrypted twice
    /// is reported as different.
    pub fn has_same_content(&self, other: &SecretVersion) -> bool {
        self.key == other.key
            && self.encrypted_value == other.encrypted_value
            && self.encrypted_comment == other.encrypted_comment
            && self.skip_multiline_encoding == other.skip_multiline_encoding
            && self.metadata == other.metadata
    }

    /// A new version of the same secret carrying this version's content,
    /// authored by `actor`.
    pub fn copy_as(&self, folder_id: Uuid, version_number: i32, actor: &Actor) -> Self {
        let (user_actor_id, identity_actor_id) = match actor {
            Actor::User(id) => (Some(*id), None),
            Actor::Identity(id) => (None, Some(*id)),
            Actor::Platform => (None, None),
        };
        Self {
            id: Uuid::new_v4(),
            secret_id: self.secret_id,
            folder_id,
            env_id: self.env_id,
            version: version_number,
            key: self.key.clone(),
            encrypted_value: self.encrypted_value.clone(),
            encrypted_comment: self.encrypted_comment.clone(),
            skip_multiline_encoding: self.skip_multiline_encoding,
            metadata: self.metadata.clone(),
            actor_type: Some(actor.actor_type()),
            user_actor_id,
            identity_actor_id,
            created_at: Utc::now(),
        }
    }
}
