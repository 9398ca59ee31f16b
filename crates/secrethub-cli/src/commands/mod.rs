//! CLI command definitions and dispatch.

pub mod checkpoint;
pub mod diff;
pub mod history;
pub mod jobs;
pub mod migrate;
pub mod rollback;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use secrethub_cache::CacheManager;
use secrethub_core::AppError;
use secrethub_core::config::AppConfig;
use secrethub_database::repositories::JobRepository;
use secrethub_database::{DatabasePool, PgPitStore};
use secrethub_entity::commit::Actor;
use secrethub_service::PitService;
use secrethub_worker::{JobQueue, QueueTreeCheckpointScheduler};

use crate::output::OutputFormat;

/// SecretHub: folder history administration
#[derive(Debug, Parser)]
#[command(name = "secrethub", version, about, long_about = None)]
pub struct Cli {
    /// Base configuration file (without extension)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay, loaded from `config/{env}.toml`
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Folder commit history
    History(history::HistoryArgs),
    /// Compare folder states
    Diff(diff::DiffArgs),
    /// Folder and tree checkpoints
    Checkpoint(checkpoint::CheckpointArgs),
    /// Roll folders back or revert commits
    Rollback(rollback::RollbackArgs),
    /// Background job queue
    Jobs(jobs::JobsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let ctx = Context::connect(&self.config, &self.env).await?;
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &ctx).await,
            Commands::History(args) => history::execute(args, &ctx, self.format).await,
            Commands::Diff(args) => diff::execute(args, &ctx, self.format).await,
            Commands::Checkpoint(args) => checkpoint::execute(args, &ctx, self.format).await,
            Commands::Rollback(args) => rollback::execute(args, &ctx, self.format).await,
            Commands::Jobs(args) => jobs::execute(args, &ctx, self.format).await,
        }
    }
}

/// Loaded configuration and an open pool.
pub struct Context {
    pub config: AppConfig,
    pub db: DatabasePool,
}

impl Context {
    async fn connect(base: &str, env: &str) -> Result<Self, AppError> {
        let config = AppConfig::load_from(base, env)?;
        tracing::debug!(base, env, "Configuration loaded");
        let db = DatabasePool::connect(&config.database).await?;
        Ok(Self { config, db })
    }

    /// Job queue over the shared pool.
    pub fn job_queue(&self) -> Arc<JobQueue> {
        Arc::new(JobQueue::new(
            Arc::new(JobRepository::new(self.db.pool().clone())),
            format!("cli-{}", std::process::id()),
        ))
    }

    /// The point-in-time engine over PostgreSQL, scheduling through the job queue.
    pub async fn pit(&self) -> Result<PitService, AppError> {
        let cache = Arc::new(CacheManager::new(&self.config.cache).await?);
        let scheduler = Arc::new(QueueTreeCheckpointScheduler::new(
            self.job_queue(),
            self.config.worker.max_attempts,
        ));
        Ok(PitService::new(
            Arc::new(PgPitStore::new(self.db.pool().clone())),
            cache,
            scheduler,
            self.config.pit.clone(),
        ))
    }
}

/// Acting principal: a user when given, the platform otherwise.
pub fn actor(user: Option<Uuid>) -> Actor {
    user.map_or(Actor::Platform, Actor::User)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_deep_rollback() {
        let target = Uuid::new_v4();
        let env = Uuid::new_v4();
        let project = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "secrethub",
            "--format",
            "json",
            "rollback",
            "deep",
            "--target",
            &target.to_string(),
            "--env",
            &env.to_string(),
            "--project",
            &project.to_string(),
            "--yes",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Rollback(args) => {
                assert_eq!(args.project, Some(project));
                assert!(args.yes);
                assert!(matches!(
                    args.command,
                    rollback::RollbackCommand::Deep { target: t, env: e } if t == target && e == env
                ));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed_commit_id() {
        let result = Cli::try_parse_from(["secrethub", "history", "show", "not-a-uuid"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_actor_defaults_to_platform() {
        assert_eq!(actor(None), Actor::Platform);
        let user = Uuid::new_v4();
        assert_eq!(actor(Some(user)), Actor::User(user));
    }
}
