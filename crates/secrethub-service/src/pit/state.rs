//! In-memory folder state and the pure replay/diff rules over it.
//!
//! A [`FolderState`] maps each resource identity to the version the folder
//! held at some commit. States are built by loading a checkpoint and
//! replaying later commits in ascending sequence order; the last change to a
//! resource wins.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use secrethub_entity::checkpoint::CheckpointEntry;
use secrethub_entity::commit::{CommitChangeType, CommitWithChanges};
use secrethub_entity::resource::{ResourceKind, ResourceVersion};

/// One resource held by a folder, with the commit that last touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// The version the folder holds.
    pub resource: ResourceVersion,
    /// Sequence number of the commit it came from.
    pub commit_id: i64,
}

/// The resource set of a folder at one point of its history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderState {
    entries: BTreeMap<(ResourceKind, Uuid), StateEntry>,
}

impl FolderState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from a checkpoint's resources.
    pub fn from_checkpoint(resources: Vec<CheckpointEntry>) -> Self {
        let entries = resources
            .into_iter()
            .map(|entry| {
                (
                    entry.resource.key(),
                    StateEntry {
                        resource: entry.resource,
                        commit_id: entry.commit_id,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Apply one commit's changes.
    pub fn apply_commit(&mut self, commit: &CommitWithChanges) {
        for change in &commit.changes {
            let key = change.resource.key();
            match change.change_type {
                CommitChangeType::Add | CommitChangeType::Update => {
                    self.entries.insert(
                        key,
                        StateEntry {
                            resource: change.resource.clone(),
                            commit_id: commit.commit.commit_id,
                        },
                    );
                }
                CommitChangeType::Delete => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Replay commits in ascending sequence order and return how many were
    /// applied.
    pub fn replay(&mut self, commits: &[CommitWithChanges]) -> usize {
        let mut ordered: Vec<&CommitWithChanges> = commits.iter().collect();
        ordered.sort_by_key(|c| c.commit.commit_id);
        for commit in &ordered {
            self.apply_commit(commit);
        }
        ordered.len()
    }

    /// The entry for a resource, if the folder holds it.
    pub fn get(&self, kind: ResourceKind, resource_id: Uuid) -> Option<&StateEntry> {
        self.entries.get(&(kind, resource_id))
    }

    /// Whether the folder holds the resource.
    pub fn contains(&self, kind: ResourceKind, resource_id: Uuid) -> bool {
        self.entries.contains_key(&(kind, resource_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by kind then resource ID.
    pub fn iter(&self) -> impl Iterator<Item = &StateEntry> {
        self.entries.values()
    }

    /// Version IDs keyed by resource identity.
    pub fn version_ids(&self) -> BTreeMap<(ResourceKind, Uuid), Uuid> {
        self.entries
            .iter()
            .map(|(key, entry)| (*key, entry.resource.version_id))
            .collect()
    }
}

/// What applying a diff entry does to the live folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffChangeType {
    /// The resource is missing and must be created.
    Create,
    /// The resource exists at a different version.
    Update,
    /// The resource must be removed.
    Delete,
}

impl DiffChangeType {
    /// Return the change type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for DiffChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One difference between two folder states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Secret ID or folder ID.
    pub resource_id: Uuid,
    /// What to do.
    pub change_type: DiffChangeType,
    /// Target version for creates and updates; the version being removed
    /// for deletes.
    pub version_id: Uuid,
    /// Sequence number of the commit `version_id` came from.
    pub commit_id: i64,
    /// Secret key or folder name at `version_id`.
    pub name: String,
    /// Version number of `version_id`.
    pub version: i32,
    /// Version currently held, for updates.
    pub from_version_id: Option<Uuid>,
    /// Version number currently held, for updates.
    pub from_version: Option<i32>,
}

impl ResourceChange {
    fn from_entry(entry: &StateEntry, change_type: DiffChangeType) -> Self {
        Self {
            kind: entry.resource.kind,
            resource_id: entry.resource.resource_id,
            change_type,
            version_id: entry.resource.version_id,
            commit_id: entry.commit_id,
            name: entry.resource.name.clone(),
            version: entry.resource.version,
            from_version_id: None,
            from_version: None,
        }
    }

    pub fn is_secret(&self) -> bool {
        self.kind == ResourceKind::Secret
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ResourceKind::Folder
    }
}

/// Changes that turn `current` into `target`.
///
/// Deletes and updates come first in `current` order, then creates in
/// `target` order. Resources held at the same version are omitted.
pub fn diff_states(target: &FolderState, current: &FolderState) -> Vec<ResourceChange> {
    let mut changes = Vec::new();

    for (key, held) in &current.entries {
        match target.entries.get(key) {
            None => changes.push(ResourceChange::from_entry(held, DiffChangeType::Delete)),
            Some(wanted) if wanted.resource.version_id != held.resource.version_id => {
                let mut change = ResourceChange::from_entry(wanted, DiffChangeType::Update);
                change.from_version_id = Some(held.resource.version_id);
                change.from_version = Some(held.resource.version);
                changes.push(change);
            }
            Some(_) => {}
        }
    }

    for (key, wanted) in &target.entries {
        if !current.entries.contains_key(key) {
            changes.push(ResourceChange::from_entry(wanted, DiffChangeType::Create));
        }
    }

    changes
}

/// Every resource of `target` as a create.
pub fn all_created(target: &FolderState) -> Vec<ResourceChange> {
    target
        .iter()
        .map(|entry| ResourceChange::from_entry(entry, DiffChangeType::Create))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use secrethub_entity::commit::{ActorType, FolderCommit, ResolvedChange};

    fn commit(seq: i64, changes: Vec<(CommitChangeType, ResourceVersion)>) -> CommitWithChanges {
        CommitWithChanges {
            commit: FolderCommit {
                id: Uuid::new_v4(),
                commit_id: seq,
                position: seq,
                folder_id: Uuid::nil(),
                env_id: Uuid::nil(),
                actor_type: ActorType::Platform,
                actor_metadata: serde_json::json!({}),
                message: None,
                created_at: Utc::now(),
            },
            changes: changes
                .into_iter()
                .map(|(change_type, resource)| ResolvedChange {
                    change_type,
                    resource,
                })
                .collect(),
        }
    }

    fn secret(id: Uuid, version: i32) -> ResourceVersion {
        ResourceVersion::secret(id, Uuid::new_v4(), "KEY", version)
    }

    fn held_at(commit_id: i64, resources: Vec<ResourceVersion>) -> FolderState {
        FolderState::from_checkpoint(
            resources
                .into_iter()
                .map(|resource| CheckpointEntry { resource, commit_id })
                .collect(),
        )
    }

    #[test]
    fn test_replay_last_writer_wins() {
        let a = Uuid::new_v4();
        let v1 = secret(a, 1);
        let v2 = secret(a, 2);
        let commits = vec![
            commit(2, vec![(CommitChangeType::Update, v2.clone())]),
            commit(1, vec![(CommitChangeType::Add, v1)]),
        ];

        let mut state = FolderState::new();
        assert_eq!(state.replay(&commits), 2);

        let entry = state.get(ResourceKind::Secret, a).expect("present");
        assert_eq!(entry.resource.version_id, v2.version_id);
        assert_eq!(entry.commit_id, 2);
    }

    #[test]
    fn test_delete_removes_entry() {
        let a = Uuid::new_v4();
        let mut state = FolderState::new();
        state.replay(&[
            commit(1, vec![(CommitChangeType::Add, secret(a, 1))]),
            commit(2, vec![(CommitChangeType::Delete, secret(a, 1))]),
        ]);
        assert!(state.is_empty());
    }

    #[test]
    fn test_diff_orders_deletes_before_creates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let current = held_at(1, vec![secret(a, 1)]);
        let target = held_at(3, vec![secret(b, 1)]);

        let changes = diff_states(&target, &current);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].resource_id, a);
        assert_eq!(changes[0].change_type, DiffChangeType::Delete);
        assert_eq!(changes[1].resource_id, b);
        assert_eq!(changes[1].change_type, DiffChangeType::Create);
        assert_eq!(changes[1].commit_id, 3);
    }

    #[test]
    fn test_diff_update_carries_both_versions() {
        let a = Uuid::new_v4();
        let held = secret(a, 1);
        let wanted = secret(a, 2);
        let current = held_at(1, vec![held.clone()]);
        let target = held_at(2, vec![wanted.clone()]);

        let changes = diff_states(&target, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, DiffChangeType::Update);
        assert_eq!(changes[0].version_id, wanted.version_id);
        assert_eq!(changes[0].from_version_id, Some(held.version_id));
    }

    #[test]
    fn test_identical_states_have_no_diff() {
        let state = held_at(1, vec![secret(Uuid::new_v4(), 1)]);
        assert!(diff_states(&state, &state.clone()).is_empty());
    }

    #[test]
    fn test_same_id_across_kinds_is_distinct() {
        let id = Uuid::new_v4();
        let state = held_at(
            1,
            vec![secret(id, 1), ResourceVersion::folder(id, Uuid::new_v4(), "app", 1)],
        );
        assert_eq!(state.len(), 2);
        assert_eq!(all_created(&state).len(), 2);
    }

    #[test]
    fn test_checkpoint_keeps_origin_commit_per_entry() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let state = FolderState::from_checkpoint(vec![
            CheckpointEntry {
                resource: secret(a, 1),
                commit_id: 1,
            },
            CheckpointEntry {
                resource: secret(b, 1),
                commit_id: 4,
            },
        ]);

        assert_eq!(state.get(ResourceKind::Secret, a).map(|e| e.commit_id), Some(1));
        assert_eq!(state.get(ResourceKind::Secret, b).map(|e| e.commit_id), Some(4));
    }
}
