//! In-memory storage backend.
//!
//! All tables live behind one async mutex. A transaction holds the lock for
//! its whole lifetime and mutates a private copy of the tables, which
//! replaces the shared copy on commit. Transactions are therefore fully
//! serialized.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use secrethub_core::error::AppError;
use secrethub_core::result::AppResult;
use secrethub_core::types::pagination::{PageRequest, PageResponse};
use secrethub_entity::checkpoint::{
    CheckpointEntry, CheckpointMarker, FolderCheckpoint, FolderCheckpointResource,
    FolderTreeCheckpoint, FolderTreeCheckpointResource,
};
use secrethub_entity::commit::{
    CommitWithChanges, FolderCommit, FolderCommitChange, NewFolderCommit, ResolvedChange,
};
use secrethub_entity::folder::{Folder, FolderVersion};
use secrethub_entity::principal::{Environment, Identity, User};
use secrethub_entity::resource::ResourceVersion;
use secrethub_entity::secret::{Secret, SecretVersion};

use super::{PitStore, PitTransaction};

/// Every table of the in-memory backend.
#[derive(Debug, Clone, Default)]
struct Tables {
    environments: HashMap<Uuid, Environment>,
    users: HashMap<Uuid, User>,
    identities: HashMap<Uuid, Identity>,
    folders: HashMap<Uuid, Folder>,
    folder_versions: HashMap<Uuid, FolderVersion>,
    secrets: HashMap<Uuid, Secret>,
    secret_versions: HashMap<Uuid, SecretVersion>,
    commits: Vec<FolderCommit>,
    commit_changes: Vec<FolderCommitChange>,
    checkpoints: Vec<FolderCheckpoint>,
    checkpoint_resources: Vec<FolderCheckpointResource>,
    tree_checkpoints: Vec<FolderTreeCheckpoint>,
    tree_checkpoint_resources: Vec<FolderTreeCheckpointResource>,
    last_position: i64,
}

impl Tables {
    fn commit_by_id(&self, id: Uuid) -> Option<&FolderCommit> {
        self.commits.iter().find(|c| c.id == id)
    }

    fn folder_commits(&self, folder_id: Uuid) -> impl Iterator<Item = &FolderCommit> {
        self.commits.iter().filter(move |c| c.folder_id == folder_id)
    }

    fn env_commits(&self, env_id: Uuid) -> impl Iterator<Item = &FolderCommit> {
        self.commits.iter().filter(move |c| c.env_id == env_id)
    }

    fn latest_secret_version(&self, secret_id: Uuid) -> Option<&SecretVersion> {
        self.secret_versions
            .values()
            .filter(|v| v.secret_id == secret_id)
            .max_by_key(|v| v.version)
    }

    fn latest_folder_version(&self, folder_id: Uuid) -> Option<&FolderVersion> {
        self.folder_versions
            .values()
            .filter(|v| v.folder_id == folder_id)
            .max_by_key(|v| v.version)
    }

    fn resolve(
        &self,
        secret_version_id: Option<Uuid>,
        folder_version_id: Option<Uuid>,
    ) -> AppResult<ResourceVersion> {
        match (secret_version_id, folder_version_id) {
            (Some(id), None) => self
                .secret_versions
                .get(&id)
                .map(ResourceVersion::from)
                .ok_or_else(|| AppError::data_integrity(format!("Secret version {id} is missing"))),
            (None, Some(id)) => self
                .folder_versions
                .get(&id)
                .map(ResourceVersion::from)
                .ok_or_else(|| AppError::data_integrity(format!("Folder version {id} is missing"))),
            _ => Err(AppError::data_integrity(
                "Stored reference must point to exactly one version",
            )),
        }
    }

    fn changes_of(&self, folder_commit_id: Uuid) -> AppResult<Vec<ResolvedChange>> {
        self.commit_changes
            .iter()
            .filter(|c| c.folder_commit_id == folder_commit_id)
            .map(|c| {
                Ok(ResolvedChange {
                    change_type: c.change_type,
                    resource: self.resolve(c.secret_version_id, c.folder_version_id)?,
                })
            })
            .collect()
    }

    fn marker(
        &self,
        checkpoint_id: Uuid,
        folder_commit_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Option<CheckpointMarker> {
        self.commit_by_id(folder_commit_id).map(|commit| CheckpointMarker {
            checkpoint_id,
            folder_commit_id,
            commit_id: commit.commit_id,
            position: commit.position,
            created_at,
        })
    }

    fn folder_markers(&self, folder_id: Uuid) -> Vec<CheckpointMarker> {
        self.checkpoints
            .iter()
            .filter_map(|cp| self.marker(cp.id, cp.folder_commit_id, cp.created_at))
            .filter(|m| {
                self.commit_by_id(m.folder_commit_id)
                    .is_some_and(|c| c.folder_id == folder_id)
            })
            .collect()
    }
}

/// In-memory [`PitStore`] used by tests and embedded deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryPitStore {
    tables: Arc<Mutex<Tables>>,
    fail_checkpoint_writes: Arc<AtomicBool>,
}

impl MemoryPitStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an environment.
    pub async fn add_environment(&self, environment: Environment) {
        self.tables
            .lock()
            .await
            .environments
            .insert(environment.id, environment);
    }

    /// Register a user.
    pub async fn add_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    /// Register a machine identity.
    pub async fn add_identity(&self, identity: Identity) {
        self.tables.lock().await.identities.insert(identity.id, identity);
    }

    /// Number of folder checkpoints stored.
    pub async fn checkpoint_count(&self) -> usize {
        self.tables.lock().await.checkpoints.len()
    }

    /// Number of tree checkpoints stored.
    pub async fn tree_checkpoint_count(&self) -> usize {
        self.tables.lock().await.tree_checkpoints.len()
    }

    /// Make folder and tree checkpoint resource inserts fail with a
    /// database error until switched back off.
    pub fn set_checkpoint_writes_failing(&self, failing: bool) {
        self.fail_checkpoint_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PitStore for MemoryPitStore {
    async fn begin(&self) -> AppResult<Box<dyn PitTransaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryPitTransaction {
            guard,
            working,
            savepoints: Vec::new(),
            locked: HashSet::new(),
            fail_checkpoint_writes: Arc::clone(&self.fail_checkpoint_writes),
        }))
    }
}

/// A serialized transaction over [`MemoryPitStore`].
#[derive(Debug)]
pub struct MemoryPitTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    savepoints: Vec<(String, Tables)>,
    locked: HashSet<Uuid>,
    fail_checkpoint_writes: Arc<AtomicBool>,
}

impl MemoryPitTransaction {
    fn savepoint_index(&self, name: &str) -> AppResult<usize> {
        self.savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| AppError::internal(format!("Savepoint {name} does not exist")))
    }

    fn check_checkpoint_writes(&self) -> AppResult<()> {
        if self.fail_checkpoint_writes.load(Ordering::SeqCst) {
            return Err(AppError::database("Checkpoint writes are failing"));
        }
        Ok(())
    }
}

#[async_trait]
impl PitTransaction for MemoryPitTransaction {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryPitTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> AppResult<()> {
        self.savepoints.push((name.to_string(), self.working.clone()));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> AppResult<()> {
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index + 1);
        self.working = self.savepoints[index].1.clone();
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> AppResult<()> {
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index);
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_identity(&mut self, id: Uuid) -> AppResult<Option<Identity>> {
        Ok(self.working.identities.get(&id).cloned())
    }

    async fn find_environment(&mut self, id: Uuid) -> AppResult<Option<Environment>> {
        Ok(self.working.environments.get(&id).cloned())
    }

    async fn find_folder(&mut self, id: Uuid) -> AppResult<Option<Folder>> {
        Ok(self.working.folders.get(&id).cloned())
    }

    async fn find_folders_by_parent(&mut self, parent_id: Uuid) -> AppResult<Vec<Folder>> {
        let mut folders: Vec<Folder> = self
            .working
            .folders
            .values()
            .filter(|f| f.parent_id == Some(parent_id))
            .cloned()
            .collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    async fn find_folders_by_env(&mut self, env_id: Uuid) -> AppResult<Vec<Folder>> {
        let mut folders: Vec<Folder> = self
            .working
            .folders
            .values()
            .filter(|f| f.env_id == env_id)
            .cloned()
            .collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    async fn find_folder_subtree(&mut self, root_id: Uuid) -> AppResult<Vec<Folder>> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root_id]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(folder) = self.working.folders.get(&id) else {
                continue;
            };
            result.push(folder.clone());
            let mut children: Vec<&Folder> = self
                .working
                .folders
                .values()
                .filter(|f| f.parent_id == Some(id))
                .collect();
            children.sort_by(|a, b| a.name.cmp(&b.name));
            queue.extend(children.into_iter().map(|f| f.id));
        }
        Ok(result)
    }

    async fn lock_folder(&mut self, id: Uuid) -> AppResult<()> {
        self.locked.insert(id);
        Ok(())
    }

    async fn insert_folder(&mut self, folder: &Folder) -> AppResult<()> {
        if self.working.folders.contains_key(&folder.id) {
            return Err(AppError::conflict(format!("Folder {} already exists", folder.id)));
        }
        self.working.folders.insert(folder.id, folder.clone());
        Ok(())
    }

    async fn update_folder(&mut self, folder: &Folder) -> AppResult<()> {
        match self.working.folders.get_mut(&folder.id) {
            Some(existing) => {
                *existing = folder.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("Folder {} not found", folder.id))),
        }
    }

    async fn delete_folder(&mut self, id: Uuid) -> AppResult<bool> {
        let subtree: Vec<Uuid> = self
            .find_folder_subtree(id)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();
        if subtree.is_empty() {
            return Ok(false);
        }
        for folder_id in &subtree {
            self.working.folders.remove(folder_id);
        }
        self.working
            .secrets
            .retain(|_, secret| !subtree.contains(&secret.folder_id));
        Ok(true)
    }

    async fn find_folder_version(&mut self, id: Uuid) -> AppResult<Option<FolderVersion>> {
        Ok(self.working.folder_versions.get(&id).cloned())
    }

    async fn find_latest_folder_version(
        &mut self,
        folder_id: Uuid,
    ) -> AppResult<Option<FolderVersion>> {
        Ok(self.working.latest_folder_version(folder_id).cloned())
    }

    async fn find_child_folder_versions(
        &mut self,
        parent_id: Uuid,
    ) -> AppResult<Vec<FolderVersion>> {
        Ok(self
            .working
            .folders
            .values()
            .filter(|f| f.parent_id == Some(parent_id))
            .filter_map(|f| self.working.latest_folder_version(f.id).cloned())
            .collect())
    }

    async fn insert_folder_version(&mut self, version: &FolderVersion) -> AppResult<()> {
        self.working.folder_versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn find_secret(&mut self, id: Uuid) -> AppResult<Option<Secret>> {
        Ok(self.working.secrets.get(&id).cloned())
    }

    async fn insert_secret(&mut self, secret: &Secret) -> AppResult<()> {
        if self.working.secrets.contains_key(&secret.id) {
            return Err(AppError::conflict(format!("Secret {} already exists", secret.id)));
        }
        if !self.working.folders.contains_key(&secret.folder_id) {
            return Err(AppError::not_found(format!(
                "Folder {} not found",
                secret.folder_id
            )));
        }
        self.working.secrets.insert(secret.id, secret.clone());
        Ok(())
    }

    async fn update_secret(&mut self, secret: &Secret) -> AppResult<()> {
        match self.working.secrets.get_mut(&secret.id) {
            Some(existing) => {
                *existing = secret.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("Secret {} not found", secret.id))),
        }
    }

    async fn delete_secret(&mut self, id: Uuid) -> AppResult<bool> {
        Ok(self.working.secrets.remove(&id).is_some())
    }

    async fn find_secret_version(&mut self, id: Uuid) -> AppResult<Option<SecretVersion>> {
        Ok(self.working.secret_versions.get(&id).cloned())
    }

    async fn find_latest_secret_version(
        &mut self,
        secret_id: Uuid,
    ) -> AppResult<Option<SecretVersion>> {
        Ok(self.working.latest_secret_version(secret_id).cloned())
    }

    async fn find_previous_secret_version(
        &mut self,
        secret_id: Uuid,
        version: i32,
    ) -> AppResult<Option<SecretVersion>> {
        Ok(self
            .working
            .secret_versions
            .values()
            .filter(|v| v.secret_id == secret_id && v.version < version)
            .max_by_key(|v| v.version)
            .cloned())
    }

    async fn find_folder_secret_versions(
        &mut self,
        folder_id: Uuid,
    ) -> AppResult<Vec<SecretVersion>> {
        Ok(self
            .working
            .secrets
            .values()
            .filter(|s| s.folder_id == folder_id)
            .filter_map(|s| self.working.latest_secret_version(s.id).cloned())
            .collect())
    }

    async fn insert_secret_version(&mut self, version: &SecretVersion) -> AppResult<()> {
        self.working.secret_versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn find_commit(&mut self, id: Uuid) -> AppResult<Option<FolderCommit>> {
        Ok(self.working.commit_by_id(id).cloned())
    }

    async fn find_latest_commit(&mut self, folder_id: Uuid) -> AppResult<Option<FolderCommit>> {
        Ok(self
            .working
            .folder_commits(folder_id)
            .max_by_key(|c| c.commit_id)
            .cloned())
    }

    async fn find_commit_before(
        &mut self,
        folder_id: Uuid,
        commit_id: i64,
    ) -> AppResult<Option<FolderCommit>> {
        Ok(self
            .working
            .folder_commits(folder_id)
            .filter(|c| c.commit_id < commit_id)
            .max_by_key(|c| c.commit_id)
            .cloned())
    }

    async fn find_commit_at_position(
        &mut self,
        folder_id: Uuid,
        position: i64,
    ) -> AppResult<Option<FolderCommit>> {
        Ok(self
            .working
            .folder_commits(folder_id)
            .filter(|c| c.position <= position)
            .max_by_key(|c| c.commit_id)
            .cloned())
    }

    async fn find_commits_with_changes(
        &mut self,
        folder_id: Uuid,
        after: i64,
        up_to: i64,
    ) -> AppResult<Vec<CommitWithChanges>> {
        let mut commits: Vec<FolderCommit> = self
            .working
            .folder_commits(folder_id)
            .filter(|c| c.commit_id > after && c.commit_id <= up_to)
            .cloned()
            .collect();
        commits.sort_by_key(|c| c.commit_id);
        commits
            .into_iter()
            .map(|commit| {
                let changes = self.working.changes_of(commit.id)?;
                Ok(CommitWithChanges { commit, changes })
            })
            .collect()
    }

    async fn find_commit_changes(
        &mut self,
        folder_commit_id: Uuid,
    ) -> AppResult<Vec<ResolvedChange>> {
        self.working.changes_of(folder_commit_id)
    }

    async fn count_commits_since(&mut self, folder_id: Uuid, after: i64) -> AppResult<i64> {
        Ok(self
            .working
            .folder_commits(folder_id)
            .filter(|c| c.commit_id > after)
            .count() as i64)
    }

    async fn list_commits(
        &mut self,
        folder_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<FolderCommit>> {
        let mut commits: Vec<FolderCommit> =
            self.working.folder_commits(folder_id).cloned().collect();
        commits.sort_by(|a, b| b.commit_id.cmp(&a.commit_id));
        let total = commits.len() as u64;
        let items = commits
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(PageResponse::new(items, page.page, page.page_size, total))
    }

    async fn insert_commit(&mut self, commit: &NewFolderCommit) -> AppResult<FolderCommit> {
        if !self.locked.contains(&commit.folder_id) {
            return Err(AppError::internal(format!(
                "Folder {} must be locked before a commit is assigned a sequence",
                commit.folder_id
            )));
        }
        let duplicate = self
            .working
            .folder_commits(commit.folder_id)
            .any(|c| c.commit_id == commit.commit_id);
        if duplicate {
            return Err(AppError::conflict(format!(
                "Commit {} already exists for folder {}",
                commit.commit_id, commit.folder_id
            )));
        }
        self.working.last_position += 1;
        let row = FolderCommit {
            id: commit.id,
            commit_id: commit.commit_id,
            position: self.working.last_position,
            folder_id: commit.folder_id,
            env_id: commit.env_id,
            actor_type: commit.actor_type,
            actor_metadata: serde_json::to_value(&commit.actor_metadata)?,
            message: commit.message.clone(),
            created_at: Utc::now(),
        };
        self.working.commits.push(row.clone());
        Ok(row)
    }

    async fn insert_commit_changes(&mut self, changes: &[FolderCommitChange]) -> AppResult<()> {
        for change in changes {
            if self.working.commit_by_id(change.folder_commit_id).is_none() {
                return Err(AppError::not_found(format!(
                    "Commit {} not found",
                    change.folder_commit_id
                )));
            }
        }
        self.working.commit_changes.extend_from_slice(changes);
        Ok(())
    }

    async fn find_latest_env_commit(&mut self, env_id: Uuid) -> AppResult<Option<FolderCommit>> {
        Ok(self
            .working
            .env_commits(env_id)
            .max_by_key(|c| c.position)
            .cloned())
    }

    async fn count_env_commits_since(&mut self, env_id: Uuid, after: i64) -> AppResult<i64> {
        Ok(self
            .working
            .env_commits(env_id)
            .filter(|c| c.position > after)
            .count() as i64)
    }

    async fn find_env_commits_between(
        &mut self,
        env_id: Uuid,
        after: i64,
        up_to: i64,
    ) -> AppResult<Vec<FolderCommit>> {
        let mut commits: Vec<FolderCommit> = self
            .working
            .env_commits(env_id)
            .filter(|c| c.position > after && c.position <= up_to)
            .cloned()
            .collect();
        commits.sort_by_key(|c| c.position);
        Ok(commits)
    }

    async fn find_latest_commits_for_folders(
        &mut self,
        folder_ids: &[Uuid],
    ) -> AppResult<Vec<FolderCommit>> {
        Ok(folder_ids
            .iter()
            .filter_map(|id| {
                self.working
                    .folder_commits(*id)
                    .max_by_key(|c| c.commit_id)
                    .cloned()
            })
            .collect())
    }

    async fn find_nearest_checkpoint(
        &mut self,
        folder_id: Uuid,
        up_to: Option<i64>,
    ) -> AppResult<Option<CheckpointMarker>> {
        Ok(self
            .working
            .folder_markers(folder_id)
            .into_iter()
            .filter(|m| up_to.is_none_or(|limit| m.commit_id <= limit))
            .max_by_key(|m| m.commit_id))
    }

    async fn list_checkpoints(&mut self, folder_id: Uuid) -> AppResult<Vec<CheckpointMarker>> {
        let mut markers = self.working.folder_markers(folder_id);
        markers.sort_by(|a, b| b.commit_id.cmp(&a.commit_id));
        Ok(markers)
    }

    async fn insert_checkpoint(&mut self, checkpoint: &FolderCheckpoint) -> AppResult<()> {
        self.working.checkpoints.push(checkpoint.clone());
        Ok(())
    }

    async fn insert_checkpoint_resources(
        &mut self,
        resources: &[FolderCheckpointResource],
    ) -> AppResult<()> {
        self.check_checkpoint_writes()?;
        self.working.checkpoint_resources.extend_from_slice(resources);
        Ok(())
    }

    async fn find_checkpoint_resources(
        &mut self,
        checkpoint_id: Uuid,
    ) -> AppResult<Vec<CheckpointEntry>> {
        self.working
            .checkpoint_resources
            .iter()
            .filter(|r| r.folder_checkpoint_id == checkpoint_id)
            .map(|r| {
                Ok(CheckpointEntry {
                    resource: self.working.resolve(r.secret_version_id, r.folder_version_id)?,
                    commit_id: r.commit_id,
                })
            })
            .collect()
    }

    async fn find_nearest_tree_checkpoint(
        &mut self,
        env_id: Uuid,
        up_to: Option<i64>,
    ) -> AppResult<Option<CheckpointMarker>> {
        Ok(self
            .working
            .tree_checkpoints
            .iter()
            .filter_map(|cp| self.working.marker(cp.id, cp.folder_commit_id, cp.created_at))
            .filter(|m| {
                self.working
                    .commit_by_id(m.folder_commit_id)
                    .is_some_and(|c| c.env_id == env_id)
            })
            .filter(|m| up_to.is_none_or(|limit| m.position <= limit))
            .max_by_key(|m| m.position))
    }

    async fn insert_tree_checkpoint(&mut self, checkpoint: &FolderTreeCheckpoint) -> AppResult<()> {
        self.working.tree_checkpoints.push(checkpoint.clone());
        Ok(())
    }

    async fn insert_tree_checkpoint_resources(
        &mut self,
        resources: &[FolderTreeCheckpointResource],
    ) -> AppResult<()> {
        self.check_checkpoint_writes()?;
        self.working
            .tree_checkpoint_resources
            .extend_from_slice(resources);
        Ok(())
    }

    async fn find_tree_checkpoint_commits(
        &mut self,
        tree_checkpoint_id: Uuid,
    ) -> AppResult<Vec<FolderCommit>> {
        Ok(self
            .working
            .tree_checkpoint_resources
            .iter()
            .filter(|r| r.folder_tree_checkpoint_id == tree_checkpoint_id)
            .filter_map(|r| self.working.commit_by_id(r.folder_commit_id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrethub_entity::commit::{ActorMetadata, ActorType};

    fn folder(env_id: Uuid, parent_id: Option<Uuid>, name: &str) -> Folder {
        let now = Utc::now();
        Folder {
            id: Uuid::new_v4(),
            env_id,
            parent_id,
            name: name.to_string(),
            description: None,
            version: 1,
            is_reserved: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_commit(folder: &Folder, commit_id: i64) -> NewFolderCommit {
        NewFolderCommit {
            id: Uuid::new_v4(),
            commit_id,
            folder_id: folder.id,
            env_id: folder.env_id,
            actor_type: ActorType::Platform,
            actor_metadata: ActorMetadata::default(),
            message: None,
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryPitStore::new();
        let root = folder(Uuid::new_v4(), None, "root");

        let mut tx = store.begin().await.unwrap();
        tx.insert_folder(&root).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_folder(root.id).await.unwrap().is_none());
        tx.insert_folder(&root).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_folder(root.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_folder_cascades_to_descendants() {
        let store = MemoryPitStore::new();
        let env_id = Uuid::new_v4();
        let root = folder(env_id, None, "root");
        let child = folder(env_id, Some(root.id), "child");
        let grandchild = folder(env_id, Some(child.id), "grandchild");

        let mut tx = store.begin().await.unwrap();
        for f in [&root, &child, &grandchild] {
            tx.insert_folder(f).await.unwrap();
        }
        let subtree = tx.find_folder_subtree(root.id).await.unwrap();
        let names: Vec<&str> = subtree.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["root", "child", "grandchild"]);

        assert!(tx.delete_folder(child.id).await.unwrap());
        assert!(tx.find_folder(grandchild.id).await.unwrap().is_none());
        assert!(tx.find_folder(root.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_positions_and_duplicate_sequence() {
        let store = MemoryPitStore::new();
        let env_id = Uuid::new_v4();
        let a = folder(env_id, None, "a");
        let b = folder(env_id, None, "b");

        let mut tx = store.begin().await.unwrap();
        tx.lock_folder(a.id).await.unwrap();
        tx.lock_folder(b.id).await.unwrap();
        let first = tx.insert_commit(&new_commit(&a, 1)).await.unwrap();
        let second = tx.insert_commit(&new_commit(&b, 1)).await.unwrap();
        assert!(second.position > first.position);

        let err = tx.insert_commit(&new_commit(&a, 1)).await.unwrap_err();
        assert_eq!(err.kind, secrethub_core::error::ErrorKind::Conflict);

        let latest = tx.find_latest_env_commit(env_id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(tx.count_env_commits_since(env_id, first.position).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_requires_folder_lock() {
        let store = MemoryPitStore::new();
        let a = folder(Uuid::new_v4(), None, "a");

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_commit(&new_commit(&a, 1)).await.unwrap_err();
        assert_eq!(err.kind, secrethub_core::error::ErrorKind::Internal);

        tx.lock_folder(a.id).await.unwrap();
        assert!(tx.insert_commit(&new_commit(&a, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rollback_to_savepoint_keeps_earlier_writes() {
        let store = MemoryPitStore::new();
        let env_id = Uuid::new_v4();
        let kept = folder(env_id, None, "kept");
        let discarded = folder(env_id, None, "discarded");

        let mut tx = store.begin().await.unwrap();
        tx.insert_folder(&kept).await.unwrap();
        tx.savepoint("sp").await.unwrap();
        tx.insert_folder(&discarded).await.unwrap();
        tx.rollback_to_savepoint("sp").await.unwrap();
        tx.release_savepoint("sp").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_folder(kept.id).await.unwrap().is_some());
        assert!(tx.find_folder(discarded.id).await.unwrap().is_none());

        let err = tx.release_savepoint("sp").await.unwrap_err();
        assert_eq!(err.kind, secrethub_core::error::ErrorKind::Internal);
    }
}
