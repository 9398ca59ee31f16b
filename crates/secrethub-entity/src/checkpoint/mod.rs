//! Checkpoint entities.

pub mod folder;
pub mod tree;

pub use folder::{CheckpointEntry, CheckpointMarker, FolderCheckpoint, FolderCheckpointResource};
pub use tree::{FolderTreeCheckpoint, FolderTreeCheckpointResource};
