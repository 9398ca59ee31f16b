//! Machine identity entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A machine identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Identity {
    /// Unique identity identifier.
    pub id: Uuid,
    /// Display name, used as the commit actor name.
    pub name: String,
    /// When the identity was created.
    pub created_at: DateTime<Utc>,
}
