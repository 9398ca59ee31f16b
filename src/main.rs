//! SecretHub server: runs the point-in-time checkpoint worker.
//!
//! Wires configuration, logging, the database, the cache and the folder
//! versioning engine together, then processes queued tree checkpoint jobs
//! until interrupted.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use secrethub_cache::CacheManager;
use secrethub_core::AppError;
use secrethub_core::config::AppConfig;
use secrethub_database::repositories::JobRepository;
use secrethub_database::{DatabasePool, PgPitStore};
use secrethub_service::PitService;
use secrethub_worker::jobs::TreeCheckpointJobHandler;
use secrethub_worker::{JobExecutor, JobQueue, QueueTreeCheckpointScheduler, WorkerRunner};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from files and environment.
fn load_configuration() -> Result<AppConfig, AppError> {
    let base = std::env::var("SECRETHUB_CONFIG").unwrap_or_else(|_| "config/default".to_string());
    let env = std::env::var("SECRETHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load_from(&base, &env)
}

/// Initialize tracing; `RUST_LOG` overrides the configured level.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting SecretHub");

    let db = DatabasePool::connect(&config.database).await?;
    secrethub_database::migration::run_migrations(db.pool()).await?;

    tracing::info!(provider = %config.cache.provider, "Initializing cache");
    let cache = Arc::new(CacheManager::new(&config.cache).await?);
    if !cache.health_check().await? {
        tracing::warn!("Cache backend is not healthy; rollbacks will not evict cached secrets");
    }

    let worker_id = format!("worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let job_queue = Arc::new(JobQueue::new(
        Arc::new(JobRepository::new(db.pool().clone())),
        worker_id,
    ));

    let scheduler = Arc::new(QueueTreeCheckpointScheduler::new(
        Arc::clone(&job_queue),
        config.worker.max_attempts,
    ));
    let pit = PitService::new(
        Arc::new(PgPitStore::new(db.pool().clone())),
        cache,
        scheduler,
        config.pit.clone(),
    );
    tracing::info!(
        checkpoint_window = config.pit.checkpoint_window,
        tree_checkpoint_window = config.pit.tree_checkpoint_window,
        "Point-in-time engine ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = if config.worker.enabled {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(TreeCheckpointJobHandler::new(Arc::clone(
            &pit.checkpoints,
        ))));

        let runner = WorkerRunner::new(
            Arc::clone(&job_queue),
            Arc::new(executor),
            config.worker.clone(),
        );
        Some(tokio::spawn(async move {
            runner.run(shutdown_rx).await;
        }))
    } else {
        tracing::warn!("Background worker disabled; tree checkpoints will queue up");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    db.close().await;
    tracing::info!("SecretHub stopped");
    Ok(())
}
