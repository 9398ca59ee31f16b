//! Folder commit domain entities.

pub mod actor;
pub mod change;
pub mod model;

pub use actor::{Actor, ActorMetadata, ActorType};
pub use change::{CommitChangeType, FolderCommitChange, NewCommitChange};
pub use model::{CommitWithChanges, FolderCommit, NewFolderCommit, ResolvedChange};
