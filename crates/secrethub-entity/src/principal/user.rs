//! User entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A human user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Unique user identifier.
    pub id: Uuid,
    /// Login name, used as the commit actor name.
    pub username: String,
    /// Email address.
    pub email: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}
