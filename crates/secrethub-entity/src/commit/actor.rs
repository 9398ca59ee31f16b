//! Commit actor types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of principal that authored a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "actor_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    /// A human user.
    User,
    /// A machine identity.
    Identity,
    /// The platform itself (system operations).
    Platform,
}

impl ActorType {
    /// Return the actor type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Identity => "identity",
            Self::Platform => "platform",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The principal requesting a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Actor {
    /// A human user by ID.
    User(Uuid),
    /// A machine identity by ID.
    Identity(Uuid),
    /// The platform.
    Platform,
}

impl Actor {
    /// The stored actor type.
    pub fn actor_type(&self) -> ActorType {
        match self {
            Self::User(_) => ActorType::User,
            Self::Identity(_) => ActorType::Identity,
            Self::Platform => ActorType::Platform,
        }
    }

    /// The principal ID, if any.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Self::User(id) | Self::Identity(id) => Some(*id),
            Self::Platform => None,
        }
    }
}

/// Actor details denormalized onto each commit row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorMetadata {
    /// Principal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Display name resolved at commit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ActorMetadata {
    /// Create metadata for a resolved principal.
    pub fn new(id: Option<Uuid>, name: Option<String>) -> Self {
        Self { id, name }
    }
}
