//! Environment entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A project environment owning one folder tree.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Environment {
    /// Unique environment identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Display name.
    pub name: String,
    /// URL-safe slug.
    pub slug: String,
    /// When the environment was created.
    pub created_at: DateTime<Utc>,
}
