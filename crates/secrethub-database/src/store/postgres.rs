//! PostgreSQL storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Executor, FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use secrethub_core::error::{AppError, ErrorKind};
use secrethub_core::result::AppResult;
use secrethub_core::types::pagination::{PageRequest, PageResponse};
use secrethub_entity::checkpoint::{
    CheckpointEntry, CheckpointMarker, FolderCheckpoint, FolderCheckpointResource,
    FolderTreeCheckpoint, FolderTreeCheckpointResource,
};
use secrethub_entity::commit::{
    CommitChangeType, CommitWithChanges, FolderCommit, FolderCommitChange, NewFolderCommit,
    ResolvedChange,
};
use secrethub_entity::folder::{Folder, FolderVersion};
use secrethub_entity::principal::{Environment, Identity, User};
use secrethub_entity::resource::ResourceVersion;
use secrethub_entity::secret::{Secret, SecretVersion};

use super::{PitStore, PitTransaction};

/// Rows per multi-row `INSERT` statement.
const INSERT_CHUNK_SIZE: usize = 1000;

/// Columns describing the version a change or checkpoint row points at.
const VERSION_COLUMNS: &str = "sv.id AS secret_version_id, sv.secret_id, sv.key AS secret_key, \
     sv.version AS secret_version, fv.id AS folder_version_id, fv.folder_id AS ref_folder_id, \
     fv.name AS folder_name, fv.version AS folder_version";

/// [`PitStore`] backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgPitStore {
    pool: PgPool,
}

impl PgPitStore {
    /// Create a new store over `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PitStore for PgPitStore {
    async fn begin(&self) -> AppResult<Box<dyn PitTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        Ok(Box::new(PgPitTransaction { tx }))
    }
}

/// A PostgreSQL transaction. Dropping it without commit rolls back.
#[derive(Debug)]
pub struct PgPitTransaction {
    tx: Transaction<'static, Postgres>,
}

/// Joined version columns of a change or checkpoint resource.
#[derive(Debug, FromRow)]
struct VersionRow {
    secret_version_id: Option<Uuid>,
    secret_id: Option<Uuid>,
    secret_key: Option<String>,
    secret_version: Option<i32>,
    folder_version_id: Option<Uuid>,
    ref_folder_id: Option<Uuid>,
    folder_name: Option<String>,
    folder_version: Option<i32>,
}

impl VersionRow {
    fn into_resource(self) -> AppResult<ResourceVersion> {
        match self {
            VersionRow {
                secret_version_id: Some(version_id),
                secret_id: Some(secret_id),
                secret_key: Some(key),
                secret_version: Some(version),
                folder_version_id: None,
                ..
            } => Ok(ResourceVersion::secret(secret_id, version_id, key, version)),
            VersionRow {
                folder_version_id: Some(version_id),
                ref_folder_id: Some(folder_id),
                folder_name: Some(name),
                folder_version: Some(version),
                secret_version_id: None,
                ..
            } => Ok(ResourceVersion::folder(folder_id, version_id, name, version)),
            _ => Err(AppError::data_integrity(
                "Stored reference must point to exactly one existing version",
            )),
        }
    }
}

#[derive(Debug, FromRow)]
struct ChangeRow {
    folder_commit_id: Uuid,
    change_type: CommitChangeType,
    #[sqlx(flatten)]
    version: VersionRow,
}

fn is_identifier(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, FromRow)]
struct CheckpointResourceRow {
    commit_id: i64,
    #[sqlx(flatten)]
    version: VersionRow,
}

impl PgPitTransaction {
    /// Run a savepoint statement. Savepoint names cannot be bound as
    /// parameters, so only plain identifiers are accepted.
    async fn savepoint_statement(&mut self, statement: &str, name: &str) -> AppResult<()> {
        if !is_identifier(name) {
            return Err(AppError::internal(format!("Invalid savepoint name: {name:?}")));
        }
        let sql = format!("{statement} {name}");
        (&mut *self.tx)
            .execute(sql.as_str())
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, format!("Failed to run {statement}"), e)
            })?;
        Ok(())
    }

    async fn changes_for(&mut self, commit_ids: &[Uuid]) -> AppResult<Vec<ChangeRow>> {
        let sql = format!(
            "SELECT c.folder_commit_id, c.change_type, {VERSION_COLUMNS} \
             FROM folder_commit_changes c \
             LEFT JOIN secret_versions sv ON sv.id = c.secret_version_id \
             LEFT JOIN secret_folder_versions fv ON fv.id = c.folder_version_id \
             WHERE c.folder_commit_id = ANY($1) \
             ORDER BY c.created_at ASC, c.id ASC"
        );
        sqlx::query_as::<_, ChangeRow>(&sql)
            .bind(commit_ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to load commit changes", e)
            })
    }
}

#[async_trait]
impl PitTransaction for PgPitTransaction {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })
    }

    async fn savepoint(&mut self, name: &str) -> AppResult<()> {
        self.savepoint_statement("SAVEPOINT", name).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> AppResult<()> {
        self.savepoint_statement("ROLLBACK TO SAVEPOINT", name).await
    }

    async fn release_savepoint(&mut self, name: &str) -> AppResult<()> {
        self.savepoint_statement("RELEASE SAVEPOINT", name).await
    }

    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find user", e))
    }

    async fn find_identity(&mut self, id: Uuid) -> AppResult<Option<Identity>> {
        sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find identity", e))
    }

    async fn find_environment(&mut self, id: Uuid) -> AppResult<Option<Environment>> {
        sqlx::query_as::<_, Environment>("SELECT * FROM environments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find environment", e)
            })
    }

    async fn find_folder(&mut self, id: Uuid) -> AppResult<Option<Folder>> {
        sqlx::query_as::<_, Folder>("SELECT * FROM secret_folders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find folder", e))
    }

    async fn find_folders_by_parent(&mut self, parent_id: Uuid) -> AppResult<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(
            "SELECT * FROM secret_folders WHERE parent_id = $1 ORDER BY name ASC",
        )
        .bind(parent_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list child folders", e))
    }

    async fn find_folders_by_env(&mut self, env_id: Uuid) -> AppResult<Vec<Folder>> {
        sqlx::query_as::<_, Folder>("SELECT * FROM secret_folders WHERE env_id = $1 ORDER BY name ASC")
            .bind(env_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to list environment folders", e)
            })
    }

    async fn find_folder_subtree(&mut self, root_id: Uuid) -> AppResult<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(
            "WITH RECURSIVE subtree AS ( \
                SELECT f.*, 0 AS depth FROM secret_folders f WHERE f.id = $1 \
                UNION ALL \
                SELECT c.*, s.depth + 1 FROM secret_folders c \
                JOIN subtree s ON c.parent_id = s.id \
             ) CYCLE id SET is_cycle USING path \
             SELECT id, env_id, parent_id, name, description, version, is_reserved, \
                    created_at, updated_at \
             FROM subtree WHERE NOT is_cycle ORDER BY depth ASC, name ASC",
        )
        .bind(root_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load folder subtree", e))
    }

    async fn lock_folder(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("SELECT id FROM secret_folders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock folder", e))?;
        Ok(())
    }

    async fn insert_folder(&mut self, folder: &Folder) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO secret_folders \
             (id, env_id, parent_id, name, description, version, is_reserved, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(folder.id)
        .bind(folder.env_id)
        .bind(folder.parent_id)
        .bind(&folder.name)
        .bind(&folder.description)
        .bind(folder.version)
        .bind(folder.is_reserved)
        .bind(folder.created_at)
        .bind(folder.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create folder", e))?;
        Ok(())
    }

    async fn update_folder(&mut self, folder: &Folder) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE secret_folders SET parent_id = $2, name = $3, description = $4, version = $5, \
             updated_at = $6 WHERE id = $1",
        )
        .bind(folder.id)
        .bind(folder.parent_id)
        .bind(&folder.name)
        .bind(&folder.description)
        .bind(folder.version)
        .bind(folder.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update folder", e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Folder {} not found", folder.id)));
        }
        Ok(())
    }

    async fn delete_folder(&mut self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM secret_folders WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete folder", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_folder_version(&mut self, id: Uuid) -> AppResult<Option<FolderVersion>> {
        sqlx::query_as::<_, FolderVersion>("SELECT * FROM secret_folder_versions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find folder version", e)
            })
    }

    async fn find_latest_folder_version(
        &mut self,
        folder_id: Uuid,
    ) -> AppResult<Option<FolderVersion>> {
        sqlx::query_as::<_, FolderVersion>(
            "SELECT * FROM secret_folder_versions WHERE folder_id = $1 \
             ORDER BY version DESC LIMIT 1",
        )
        .bind(folder_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find latest folder version", e)
        })
    }

    async fn find_child_folder_versions(
        &mut self,
        parent_id: Uuid,
    ) -> AppResult<Vec<FolderVersion>> {
        sqlx::query_as::<_, FolderVersion>(
            "SELECT DISTINCT ON (v.folder_id) v.* FROM secret_folder_versions v \
             JOIN secret_folders f ON f.id = v.folder_id \
             WHERE f.parent_id = $1 \
             ORDER BY v.folder_id, v.version DESC",
        )
        .bind(parent_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load child folder versions", e)
        })
    }

    async fn insert_folder_version(&mut self, version: &FolderVersion) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO secret_folder_versions \
             (id, folder_id, env_id, version, name, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(version.id)
        .bind(version.folder_id)
        .bind(version.env_id)
        .bind(version.version)
        .bind(&version.name)
        .bind(&version.description)
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create folder version", e)
        })?;
        Ok(())
    }

    async fn find_secret(&mut self, id: Uuid) -> AppResult<Option<Secret>> {
        sqlx::query_as::<_, Secret>("SELECT * FROM secrets WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find secret", e))
    }

    async fn insert_secret(&mut self, secret: &Secret) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO secrets \
             (id, folder_id, key, version, encrypted_value, encrypted_comment, \
              skip_multiline_encoding, metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(secret.id)
        .bind(secret.folder_id)
        .bind(&secret.key)
        .bind(secret.version)
        .bind(&secret.encrypted_value)
        .bind(&secret.encrypted_comment)
        .bind(secret.skip_multiline_encoding)
        .bind(&secret.metadata)
        .bind(secret.created_at)
        .bind(secret.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create secret", e))?;
        Ok(())
    }

    async fn update_secret(&mut self, secret: &Secret) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE secrets SET folder_id = $2, key = $3, version = $4, encrypted_value = $5, \
             encrypted_comment = $6, skip_multiline_encoding = $7, metadata = $8, updated_at = $9 \
             WHERE id = $1",
        )
        .bind(secret.id)
        .bind(secret.folder_id)
        .bind(&secret.key)
        .bind(secret.version)
        .bind(&secret.encrypted_value)
        .bind(&secret.encrypted_comment)
        .bind(secret.skip_multiline_encoding)
        .bind(&secret.metadata)
        .bind(secret.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update secret", e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Secret {} not found", secret.id)));
        }
        Ok(())
    }

    async fn delete_secret(&mut self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM secrets WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete secret", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_secret_version(&mut self, id: Uuid) -> AppResult<Option<SecretVersion>> {
        sqlx::query_as::<_, SecretVersion>("SELECT * FROM secret_versions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find secret version", e)
            })
    }

    async fn find_latest_secret_version(
        &mut self,
        secret_id: Uuid,
    ) -> AppResult<Option<SecretVersion>> {
        sqlx::query_as::<_, SecretVersion>(
            "SELECT * FROM secret_versions WHERE secret_id = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(secret_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find latest secret version", e)
        })
    }

    async fn find_previous_secret_version(
        &mut self,
        secret_id: Uuid,
        version: i32,
    ) -> AppResult<Option<SecretVersion>> {
        sqlx::query_as::<_, SecretVersion>(
            "SELECT * FROM secret_versions WHERE secret_id = $1 AND version < $2 \
             ORDER BY version DESC LIMIT 1",
        )
        .bind(secret_id)
        .bind(version)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find previous secret version", e)
        })
    }

    async fn find_folder_secret_versions(
        &mut self,
        folder_id: Uuid,
    ) -> AppResult<Vec<SecretVersion>> {
        sqlx::query_as::<_, SecretVersion>(
            "SELECT DISTINCT ON (v.secret_id) v.* FROM secret_versions v \
             JOIN secrets s ON s.id = v.secret_id \
             WHERE s.folder_id = $1 \
             ORDER BY v.secret_id, v.version DESC",
        )
        .bind(folder_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load folder secret versions", e)
        })
    }

    async fn insert_secret_version(&mut self, version: &SecretVersion) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO secret_versions \
             (id, secret_id, folder_id, env_id, version, key, encrypted_value, encrypted_comment, \
              skip_multiline_encoding, metadata, actor_type, user_actor_id, identity_actor_id, \
              created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(version.id)
        .bind(version.secret_id)
        .bind(version.folder_id)
        .bind(version.env_id)
        .bind(version.version)
        .bind(&version.key)
        .bind(&version.encrypted_value)
        .bind(&version.encrypted_comment)
        .bind(version.skip_multiline_encoding)
        .bind(&version.metadata)
        .bind(version.actor_type)
        .bind(version.user_actor_id)
        .bind(version.identity_actor_id)
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create secret version", e)
        })?;
        Ok(())
    }

    async fn find_commit(&mut self, id: Uuid) -> AppResult<Option<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>("SELECT * FROM folder_commits WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find commit", e))
    }

    async fn find_latest_commit(&mut self, folder_id: Uuid) -> AppResult<Option<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>(
            "SELECT * FROM folder_commits WHERE folder_id = $1 ORDER BY commit_id DESC LIMIT 1",
        )
        .bind(folder_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find latest commit", e))
    }

    async fn find_commit_before(
        &mut self,
        folder_id: Uuid,
        commit_id: i64,
    ) -> AppResult<Option<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>(
            "SELECT * FROM folder_commits WHERE folder_id = $1 AND commit_id < $2 \
             ORDER BY commit_id DESC LIMIT 1",
        )
        .bind(folder_id)
        .bind(commit_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find previous commit", e)
        })
    }

    async fn find_commit_at_position(
        &mut self,
        folder_id: Uuid,
        position: i64,
    ) -> AppResult<Option<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>(
            "SELECT * FROM folder_commits WHERE folder_id = $1 AND position <= $2 \
             ORDER BY commit_id DESC LIMIT 1",
        )
        .bind(folder_id)
        .bind(position)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find commit at position", e)
        })
    }

    async fn find_commits_with_changes(
        &mut self,
        folder_id: Uuid,
        after: i64,
        up_to: i64,
    ) -> AppResult<Vec<CommitWithChanges>> {
        let commits = sqlx::query_as::<_, FolderCommit>(
            "SELECT * FROM folder_commits WHERE folder_id = $1 AND commit_id > $2 \
             AND commit_id <= $3 ORDER BY commit_id ASC",
        )
        .bind(folder_id)
        .bind(after)
        .bind(up_to)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load commits", e))?;

        let ids: Vec<Uuid> = commits.iter().map(|c| c.id).collect();
        let mut grouped: HashMap<Uuid, Vec<ResolvedChange>> = HashMap::new();
        for row in self.changes_for(&ids).await? {
            grouped
                .entry(row.folder_commit_id)
                .or_default()
                .push(ResolvedChange {
                    change_type: row.change_type,
                    resource: row.version.into_resource()?,
                });
        }

        Ok(commits
            .into_iter()
            .map(|commit| {
                let changes = grouped.remove(&commit.id).unwrap_or_default();
                CommitWithChanges { commit, changes }
            })
            .collect())
    }

    async fn find_commit_changes(
        &mut self,
        folder_commit_id: Uuid,
    ) -> AppResult<Vec<ResolvedChange>> {
        self.changes_for(&[folder_commit_id])
            .await?
            .into_iter()
            .map(|row| {
                Ok(ResolvedChange {
                    change_type: row.change_type,
                    resource: row.version.into_resource()?,
                })
            })
            .collect()
    }

    async fn count_commits_since(&mut self, folder_id: Uuid, after: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM folder_commits WHERE folder_id = $1 AND commit_id > $2",
        )
        .bind(folder_id)
        .bind(after)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count commits", e))
    }

    async fn list_commits(
        &mut self,
        folder_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<FolderCommit>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM folder_commits WHERE folder_id = $1")
                .bind(folder_id)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to count commits", e)
                })?;

        let commits = sqlx::query_as::<_, FolderCommit>(
            "SELECT * FROM folder_commits WHERE folder_id = $1 \
             ORDER BY commit_id DESC LIMIT $2 OFFSET $3",
        )
        .bind(folder_id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list commits", e))?;

        Ok(PageResponse::new(
            commits,
            page.page,
            page.page_size,
            total as u64,
        ))
    }

    async fn insert_commit(&mut self, commit: &NewFolderCommit) -> AppResult<FolderCommit> {
        let metadata = serde_json::to_value(&commit.actor_metadata)?;
        sqlx::query_as::<_, FolderCommit>(
            "INSERT INTO folder_commits \
             (id, commit_id, folder_id, env_id, actor_type, actor_metadata, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(commit.id)
        .bind(commit.commit_id)
        .bind(commit.folder_id)
        .bind(commit.env_id)
        .bind(commit.actor_type)
        .bind(metadata)
        .bind(&commit.message)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            let duplicate = matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
            if duplicate {
                AppError::with_source(
                    ErrorKind::Conflict,
                    format!(
                        "Commit {} already exists for folder {}",
                        commit.commit_id, commit.folder_id
                    ),
                    e,
                )
            } else {
                AppError::with_source(ErrorKind::Database, "Failed to create commit", e)
            }
        })
    }

    async fn insert_commit_changes(&mut self, changes: &[FolderCommitChange]) -> AppResult<()> {
        for chunk in changes.chunks(INSERT_CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO folder_commit_changes \
                 (id, folder_commit_id, change_type, secret_version_id, folder_version_id, created_at) ",
            );
            builder.push_values(chunk, |mut row, change| {
                row.push_bind(change.id)
                    .push_bind(change.folder_commit_id)
                    .push_bind(change.change_type)
                    .push_bind(change.secret_version_id)
                    .push_bind(change.folder_version_id)
                    .push_bind(change.created_at);
            });
            builder.build().execute(&mut *self.tx).await.map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to create commit changes", e)
            })?;
        }
        Ok(())
    }

    async fn find_latest_env_commit(&mut self, env_id: Uuid) -> AppResult<Option<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>(
            "SELECT * FROM folder_commits WHERE env_id = $1 ORDER BY position DESC LIMIT 1",
        )
        .bind(env_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find latest environment commit", e)
        })
    }

    async fn count_env_commits_since(&mut self, env_id: Uuid, after: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM folder_commits WHERE env_id = $1 AND position > $2",
        )
        .bind(env_id)
        .bind(after)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count environment commits", e)
        })
    }

    async fn find_env_commits_between(
        &mut self,
        env_id: Uuid,
        after: i64,
        up_to: i64,
    ) -> AppResult<Vec<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>(
            "SELECT * FROM folder_commits WHERE env_id = $1 AND position > $2 AND position <= $3 \
             ORDER BY position ASC",
        )
        .bind(env_id)
        .bind(after)
        .bind(up_to)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load environment commits", e)
        })
    }

    async fn find_latest_commits_for_folders(
        &mut self,
        folder_ids: &[Uuid],
    ) -> AppResult<Vec<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>(
            "SELECT DISTINCT ON (folder_id) * FROM folder_commits WHERE folder_id = ANY($1) \
             ORDER BY folder_id, commit_id DESC",
        )
        .bind(folder_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load latest folder commits", e)
        })
    }

    async fn find_nearest_checkpoint(
        &mut self,
        folder_id: Uuid,
        up_to: Option<i64>,
    ) -> AppResult<Option<CheckpointMarker>> {
        sqlx::query_as::<_, CheckpointMarker>(
            "SELECT cp.id AS checkpoint_id, cp.folder_commit_id, c.commit_id, c.position, \
                    cp.created_at \
             FROM folder_checkpoints cp JOIN folder_commits c ON c.id = cp.folder_commit_id \
             WHERE c.folder_id = $1 AND ($2::BIGINT IS NULL OR c.commit_id <= $2) \
             ORDER BY c.commit_id DESC LIMIT 1",
        )
        .bind(folder_id)
        .bind(up_to)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find checkpoint", e))
    }

    async fn list_checkpoints(&mut self, folder_id: Uuid) -> AppResult<Vec<CheckpointMarker>> {
        sqlx::query_as::<_, CheckpointMarker>(
            "SELECT cp.id AS checkpoint_id, cp.folder_commit_id, c.commit_id, c.position, \
                    cp.created_at \
             FROM folder_checkpoints cp JOIN folder_commits c ON c.id = cp.folder_commit_id \
             WHERE c.folder_id = $1 ORDER BY c.commit_id DESC",
        )
        .bind(folder_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list checkpoints", e))
    }

    async fn insert_checkpoint(&mut self, checkpoint: &FolderCheckpoint) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO folder_checkpoints (id, folder_commit_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(checkpoint.id)
        .bind(checkpoint.folder_commit_id)
        .bind(checkpoint.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create checkpoint", e))?;
        Ok(())
    }

    async fn insert_checkpoint_resources(
        &mut self,
        resources: &[FolderCheckpointResource],
    ) -> AppResult<()> {
        for chunk in resources.chunks(INSERT_CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO folder_checkpoint_resources \
                 (id, folder_checkpoint_id, secret_version_id, folder_version_id, commit_id, \
                 created_at) ",
            );
            builder.push_values(chunk, |mut row, resource| {
                row.push_bind(resource.id)
                    .push_bind(resource.folder_checkpoint_id)
                    .push_bind(resource.secret_version_id)
                    .push_bind(resource.folder_version_id)
                    .push_bind(resource.commit_id)
                    .push_bind(resource.created_at);
            });
            builder.build().execute(&mut *self.tx).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    "Failed to create checkpoint resources",
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn find_checkpoint_resources(
        &mut self,
        checkpoint_id: Uuid,
    ) -> AppResult<Vec<CheckpointEntry>> {
        let sql = format!(
            "SELECT r.commit_id, {VERSION_COLUMNS} FROM folder_checkpoint_resources r \
             LEFT JOIN secret_versions sv ON sv.id = r.secret_version_id \
             LEFT JOIN secret_folder_versions fv ON fv.id = r.folder_version_id \
             WHERE r.folder_checkpoint_id = $1"
        );
        sqlx::query_as::<_, CheckpointResourceRow>(&sql)
            .bind(checkpoint_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to load checkpoint resources", e)
            })?
            .into_iter()
            .map(|row| {
                Ok(CheckpointEntry {
                    resource: row.version.into_resource()?,
                    commit_id: row.commit_id,
                })
            })
            .collect()
    }

    async fn find_nearest_tree_checkpoint(
        &mut self,
        env_id: Uuid,
        up_to: Option<i64>,
    ) -> AppResult<Option<CheckpointMarker>> {
        sqlx::query_as::<_, CheckpointMarker>(
            "SELECT t.id AS checkpoint_id, t.folder_commit_id, c.commit_id, c.position, \
                    t.created_at \
             FROM folder_tree_checkpoints t JOIN folder_commits c ON c.id = t.folder_commit_id \
             WHERE c.env_id = $1 AND ($2::BIGINT IS NULL OR c.position <= $2) \
             ORDER BY c.position DESC LIMIT 1",
        )
        .bind(env_id)
        .bind(up_to)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find tree checkpoint", e)
        })
    }

    async fn insert_tree_checkpoint(&mut self, checkpoint: &FolderTreeCheckpoint) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO folder_tree_checkpoints (id, folder_commit_id, created_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(checkpoint.id)
        .bind(checkpoint.folder_commit_id)
        .bind(checkpoint.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create tree checkpoint", e)
        })?;
        Ok(())
    }

    async fn insert_tree_checkpoint_resources(
        &mut self,
        resources: &[FolderTreeCheckpointResource],
    ) -> AppResult<()> {
        for chunk in resources.chunks(INSERT_CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO folder_tree_checkpoint_resources \
                 (id, folder_tree_checkpoint_id, folder_id, folder_commit_id, created_at) ",
            );
            builder.push_values(chunk, |mut row, resource| {
                row.push_bind(resource.id)
                    .push_bind(resource.folder_tree_checkpoint_id)
                    .push_bind(resource.folder_id)
                    .push_bind(resource.folder_commit_id)
                    .push_bind(resource.created_at);
            });
            builder.build().execute(&mut *self.tx).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    "Failed to create tree checkpoint resources",
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn find_tree_checkpoint_commits(
        &mut self,
        tree_checkpoint_id: Uuid,
    ) -> AppResult<Vec<FolderCommit>> {
        sqlx::query_as::<_, FolderCommit>(
            "SELECT c.* FROM folder_tree_checkpoint_resources r \
             JOIN folder_commits c ON c.id = r.folder_commit_id \
             WHERE r.folder_tree_checkpoint_id = $1",
        )
        .bind(tree_checkpoint_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load tree checkpoint commits", e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> VersionRow {
        VersionRow {
            secret_version_id: None,
            secret_id: None,
            secret_key: None,
            secret_version: None,
            folder_version_id: None,
            ref_folder_id: None,
            folder_name: None,
            folder_version: None,
        }
    }

    #[test]
    fn test_version_row_resolves_secret() {
        let secret_id = Uuid::new_v4();
        let version_id = Uuid::new_v4();
        let resource = VersionRow {
            secret_version_id: Some(version_id),
            secret_id: Some(secret_id),
            secret_key: Some("API_KEY".to_string()),
            secret_version: Some(3),
            ..row()
        }
        .into_resource()
        .unwrap();
        assert_eq!(resource, ResourceVersion::secret(secret_id, version_id, "API_KEY", 3));
    }

    #[test]
    fn test_version_row_rejects_dangling_reference() {
        let err = row().into_resource().unwrap_err();
        assert_eq!(err.kind, ErrorKind::DataIntegrity);
    }

    #[test]
    fn test_savepoint_names_are_plain_identifiers() {
        assert!(is_identifier("pit_checkpoint"));
        assert!(is_identifier("_sp1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1sp"));
        assert!(!is_identifier("sp; DROP TABLE folder_commits"));
    }
}
