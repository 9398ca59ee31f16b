//! Database migration management commands.

use clap::{Args, Subcommand};

use secrethub_core::AppError;
use secrethub_database::migration;

use super::Context;
use crate::output;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Show migration status
    Status,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, ctx: &Context) -> Result<(), AppError> {
    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            migration::run_migrations(ctx.db.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Status => {
            let status = migration::migration_status(ctx.db.pool()).await?;
            println!("Migration status:");
            for entry in &status {
                let state = if entry.applied { "applied" } else { "pending" };
                println!("  {} - {} ({})", entry.version, entry.description, state);
            }
        }
    }

    Ok(())
}
