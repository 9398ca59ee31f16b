//! Built-in job handlers.

pub mod tree_checkpoint;

pub use tree_checkpoint::TreeCheckpointJobHandler;
