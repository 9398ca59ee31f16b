//! Shared fixtures: an in-memory store plus helpers that mimic the folder
//! and secret CRUD paths, each recording its own commit.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use secrethub_cache::CacheManager;
use secrethub_core::AppResult;
use secrethub_core::config::PitConfig;
use secrethub_core::traits::CacheProvider;
use secrethub_core::types::PageRequest;
use secrethub_database::{MemoryPitStore, PitStore, PitTransaction};
use secrethub_entity::commit::{Actor, CommitChangeType, FolderCommit, NewCommitChange};
use secrethub_entity::folder::{Folder, FolderVersion};
use secrethub_entity::principal::{Environment, User};
use secrethub_entity::secret::{Secret, SecretVersion};
use secrethub_service::{CommitRequest, PitService, TreeCheckpointScheduler};

/// Scheduler that remembers which environments were scheduled.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<Uuid>>,
}

impl RecordingScheduler {
    pub async fn scheduled(&self) -> Vec<Uuid> {
        self.scheduled.lock().await.clone()
    }
}

#[async_trait]
impl TreeCheckpointScheduler for RecordingScheduler {
    async fn schedule_tree_checkpoint(&self, env_id: Uuid) -> AppResult<()> {
        self.scheduled.lock().await.push(env_id);
        Ok(())
    }
}

/// Cache backend that remembers which patterns were evicted.
#[derive(Debug, Default)]
pub struct RecordingCache {
    evicted: Mutex<Vec<String>>,
}

impl RecordingCache {
    pub async fn evicted(&self) -> Vec<String> {
        self.evicted.lock().await.clone()
    }
}

#[async_trait]
impl CacheProvider for RecordingCache {
    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        self.evicted.lock().await.push(pattern.to_string());
        Ok(1)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

pub struct Harness {
    pub store: Arc<MemoryPitStore>,
    pub scheduler: Arc<RecordingScheduler>,
    pub cache: Arc<RecordingCache>,
    pub pit: PitService,
    pub env_id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(PitConfig::default()).await
    }

    pub async fn with_config(config: PitConfig) -> Self {
        let store = Arc::new(MemoryPitStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let cache = Arc::new(RecordingCache::default());

        let project_id = Uuid::new_v4();
        let env_id = Uuid::new_v4();
        store
            .add_environment(Environment {
                id: env_id,
                project_id,
                name: "Production".into(),
                slug: "prod".into(),
                created_at: Utc::now(),
            })
            .await;

        let user_id = Uuid::new_v4();
        store
            .add_user(User {
                id: user_id,
                username: "alice".into(),
                email: Some("alice@example.com".into()),
                created_at: Utc::now(),
            })
            .await;

        let dyn_store: Arc<dyn PitStore> = store.clone();
        let dyn_scheduler: Arc<dyn TreeCheckpointScheduler> = scheduler.clone();
        let pit = PitService::new(
            dyn_store,
            Arc::new(CacheManager::from_provider(cache.clone())),
            dyn_scheduler,
            config,
        );

        Self {
            store,
            scheduler,
            cache,
            pit,
            env_id,
            project_id,
            user_id,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::User(self.user_id)
    }

    /// Create the environment's root folder. Roots have no parent to
    /// commit against.
    pub async fn create_root_folder(&self) -> Uuid {
        let folder = self.new_folder(None, "root");
        let mut tx = self.store.begin().await.expect("begin");
        tx.insert_folder(&folder).await.expect("insert folder");
        tx.insert_folder_version(&folder_version(&folder))
            .await
            .expect("insert folder version");
        tx.commit().await.expect("commit");
        folder.id
    }

    /// Create a subfolder and record it on the parent.
    pub async fn create_folder(&self, parent_id: Uuid, name: &str) -> Uuid {
        let folder = self.new_folder(Some(parent_id), name);
        let version = folder_version(&folder);

        let mut tx = self.store.begin().await.expect("begin");
        tx.insert_folder(&folder).await.expect("insert folder");
        tx.insert_folder_version(&version)
            .await
            .expect("insert folder version");
        self.pit
            .commits
            .create_commit_in(
                tx.as_mut(),
                CommitRequest::new(
                    self.actor(),
                    parent_id,
                    vec![NewCommitChange::folder(CommitChangeType::Add, version.id)],
                )
                .with_message(format!("Created folder {name}")),
            )
            .await
            .expect("commit folder add");
        tx.commit().await.expect("commit");
        folder.id
    }

    /// Create a secret in a folder and record it.
    pub async fn create_secret(&self, folder_id: Uuid, key: &str, value: &str) -> Uuid {
        let secret_id = Uuid::new_v4();
        let version = self.secret_version(secret_id, folder_id, 1, key, value);

        let mut tx = self.store.begin().await.expect("begin");
        tx.insert_secret_version(&version)
            .await
            .expect("insert secret version");
        tx.insert_secret(&Secret::from_version(&version, folder_id, 1))
            .await
            .expect("insert secret");
        self.pit
            .commits
            .create_commit_in(
                tx.as_mut(),
                CommitRequest::new(
                    self.actor(),
                    folder_id,
                    vec![NewCommitChange::secret(CommitChangeType::Add, version.id)],
                ),
            )
            .await
            .expect("commit secret add");
        tx.commit().await.expect("commit");
        secret_id
    }

    /// Create a secret without recording a commit, as a folder that
    /// predates history tracking would hold.
    pub async fn insert_untracked_secret(&self, folder_id: Uuid, key: &str, value: &str) -> Uuid {
        let secret_id = Uuid::new_v4();
        let version = self.secret_version(secret_id, folder_id, 1, key, value);

        let mut tx = self.store.begin().await.expect("begin");
        tx.insert_secret_version(&version)
            .await
            .expect("insert secret version");
        tx.insert_secret(&Secret::from_version(&version, folder_id, 1))
            .await
            .expect("insert secret");
        tx.commit().await.expect("commit");
        secret_id
    }

    /// Write a new value to a secret and record it. Returns the commit,
    /// which is absent when the value did not change.
    pub async fn update_secret(&self, secret_id: Uuid, value: &str) -> Option<FolderCommit> {
        let mut tx = self.store.begin().await.expect("begin");
        let mut secret = tx
            .find_secret(secret_id)
            .await
            .expect("find secret")
            .expect("secret exists");
        let next = secret.version + 1;
        let version = self.secret_version(secret_id, secret.folder_id, next, &secret.key, value);

        tx.insert_secret_version(&version)
            .await
            .expect("insert secret version");
        secret.apply_version(&version, next);
        tx.update_secret(&secret).await.expect("update secret");
        let commit = self
            .pit
            .commits
            .create_commit_in(
                tx.as_mut(),
                CommitRequest::new(
                    self.actor(),
                    secret.folder_id,
                    vec![NewCommitChange::secret(CommitChangeType::Update, version.id)],
                ),
            )
            .await
            .expect("commit secret update");
        tx.commit().await.expect("commit");
        commit
    }

    /// Delete a secret and record it.
    pub async fn delete_secret(&self, secret_id: Uuid) {
        let mut tx = self.store.begin().await.expect("begin");
        let secret = tx
            .find_secret(secret_id)
            .await
            .expect("find secret")
            .expect("secret exists");
        let version = tx
            .find_latest_secret_version(secret_id)
            .await
            .expect("find version")
            .expect("version exists");

        tx.delete_secret(secret_id).await.expect("delete secret");
        self.pit
            .commits
            .create_commit_in(
                tx.as_mut(),
                CommitRequest::new(
                    self.actor(),
                    secret.folder_id,
                    vec![NewCommitChange::secret(CommitChangeType::Delete, version.id)],
                ),
            )
            .await
            .expect("commit secret delete");
        tx.commit().await.expect("commit");
    }

    /// Delete a subfolder and record it on the parent.
    pub async fn delete_folder(&self, folder_id: Uuid) {
        let mut tx = self.store.begin().await.expect("begin");
        let folder = tx
            .find_folder(folder_id)
            .await
            .expect("find folder")
            .expect("folder exists");
        let parent_id = folder.parent_id.expect("subfolder");
        let version = tx
            .find_latest_folder_version(folder_id)
            .await
            .expect("find version")
            .expect("version exists");

        tx.delete_folder(folder_id).await.expect("delete folder");
        self.pit
            .commits
            .create_commit_in(
                tx.as_mut(),
                CommitRequest::new(
                    self.actor(),
                    parent_id,
                    vec![NewCommitChange::folder(CommitChangeType::Delete, version.id)],
                ),
            )
            .await
            .expect("commit folder delete");
        tx.commit().await.expect("commit");
    }

    pub async fn latest_commit(&self, folder_id: Uuid) -> FolderCommit {
        self.pit
            .history
            .latest_commit(folder_id)
            .await
            .expect("latest commit")
            .expect("folder has commits")
    }

    pub async fn commit_count(&self, folder_id: Uuid) -> u64 {
        self.pit
            .history
            .list_commits(folder_id, &PageRequest::new(1, 1))
            .await
            .expect("list commits")
            .total_items
    }

    pub async fn live_secret(&self, secret_id: Uuid) -> Option<Secret> {
        let mut tx = self.store.begin().await.expect("begin");
        tx.find_secret(secret_id).await.expect("find secret")
    }

    /// Plaintext of a live secret's current value.
    pub async fn secret_value(&self, secret_id: Uuid) -> Option<String> {
        self.live_secret(secret_id)
            .await
            .and_then(|s| s.encrypted_value)
            .map(|v| String::from_utf8(v).expect("utf8"))
    }

    pub async fn live_folder(&self, folder_id: Uuid) -> Option<Folder> {
        let mut tx = self.store.begin().await.expect("begin");
        tx.find_folder(folder_id).await.expect("find folder")
    }

    fn new_folder(&self, parent_id: Option<Uuid>, name: &str) -> Folder {
        let now = Utc::now();
        Folder {
            id: Uuid::new_v4(),
            env_id: self.env_id,
            parent_id,
            name: name.into(),
            description: None,
            version: 1,
            is_reserved: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn secret_version(
        &self,
        secret_id: Uuid,
        folder_id: Uuid,
        version: i32,
        key: &str,
        value: &str,
    ) -> SecretVersion {
        SecretVersion {
            id: Uuid::new_v4(),
            secret_id,
            folder_id,
            env_id: self.env_id,
            version,
            key: key.into(),
            encrypted_value: Some(value.as_bytes().to_vec()),
            encrypted_comment: None,
            skip_multiline_encoding: false,
            metadata: None,
            actor_type: Some(self.actor().actor_type()),
            user_actor_id: Some(self.user_id),
            identity_actor_id: None,
            created_at: Utc::now(),
        }
    }
}

fn folder_version(folder: &Folder) -> FolderVersion {
    FolderVersion {
        id: Uuid::new_v4(),
        folder_id: folder.id,
        env_id: folder.env_id,
        version: folder.version,
        name: folder.name.clone(),
        description: folder.description.clone(),
        created_at: folder.created_at,
    }
}
