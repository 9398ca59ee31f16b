//! Wiring of the point-in-time services behind one handle.

use std::sync::Arc;

use secrethub_cache::CacheManager;
use secrethub_core::config::PitConfig;
use secrethub_database::PitStore;

use super::checkpoint::CheckpointService;
use super::commit::CommitService;
use super::history::HistoryService;
use super::rollback::RollbackService;
use super::scheduler::TreeCheckpointScheduler;

/// All point-in-time services built over one store.
#[derive(Debug, Clone)]
pub struct PitService {
    pub commits: Arc<CommitService>,
    pub checkpoints: Arc<CheckpointService>,
    pub rollback: Arc<RollbackService>,
    pub history: Arc<HistoryService>,
}

impl PitService {
    /// Build every service from its shared dependencies.
    pub fn new(
        store: Arc<dyn PitStore>,
        cache: Arc<CacheManager>,
        scheduler: Arc<dyn TreeCheckpointScheduler>,
        config: PitConfig,
    ) -> Self {
        let checkpoints = Arc::new(CheckpointService::new(Arc::clone(&store), config.clone()));
        let commits = Arc::new(CommitService::new(
            Arc::clone(&store),
            Arc::clone(&checkpoints),
            Arc::clone(&scheduler),
            config.clone(),
        ));
        let rollback = Arc::new(RollbackService::new(
            Arc::clone(&store),
            Arc::clone(&commits),
            cache,
            scheduler,
            config,
        ));
        let history = Arc::new(HistoryService::new(store));

        Self {
            commits,
            checkpoints,
            rollback,
            history,
        }
    }
}
