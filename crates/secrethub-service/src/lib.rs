//! # secrethub-service
//!
//! Point-in-time versioning for secret folders: the commit log, folder and
//! tree checkpoints, state reconstruction, diffing and rollback.
//!
//! Services follow constructor injection: storage, cache and the checkpoint
//! scheduler are passed in as `Arc`s so that tests can substitute in-memory
//! implementations.

pub mod pit;

pub use pit::checkpoint::CheckpointService;
pub use pit::commit::{CommitRequest, CommitService};
pub use pit::history::{CommitDetails, HistoryService};
pub use pit::rollback::{
    ApplyOutcome, ApplyRequest, DeepRollbackOutcome, DeepRollbackRequest, FolderDiff,
    FolderRollback, RevertOutcome, RollbackService,
};
pub use pit::scheduler::TreeCheckpointScheduler;
pub use pit::service::PitService;
pub use pit::state::{DiffChangeType, FolderState, ResourceChange};
