//! Folder and tree checkpoint commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use secrethub_core::AppError;
use secrethub_entity::checkpoint::CheckpointMarker;

use super::Context;
use super::history::CommitRow;
use crate::output::{self, OutputFormat};

/// Arguments for checkpoint commands
#[derive(Debug, Args)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    pub command: CheckpointCommand,
}

/// Checkpoint subcommands
#[derive(Debug, Subcommand)]
pub enum CheckpointCommand {
    /// List a folder's checkpoints, newest first
    List {
        /// Folder ID
        #[arg(long)]
        folder: Uuid,
    },
    /// Create a folder checkpoint
    Create {
        /// Folder ID
        #[arg(long)]
        folder: Uuid,
        /// Anchor commit (latest when omitted)
        #[arg(long)]
        commit: Option<Uuid>,
        /// Ignore the checkpoint window
        #[arg(long)]
        force: bool,
    },
    /// Evaluate an environment's tree checkpoint policy now
    Tree {
        /// Environment ID
        #[arg(long)]
        env: Uuid,
    },
    /// Show every folder's commit as of an environment position
    At {
        /// Environment ID
        #[arg(long)]
        env: Uuid,
        /// Commit position
        #[arg(long)]
        position: i64,
    },
}

/// Checkpoint display row
#[derive(Debug, Serialize, Tabled)]
struct CheckpointRow {
    checkpoint_id: Uuid,
    #[tabled(rename = "seq")]
    commit_id: i64,
    position: i64,
    folder_commit_id: Uuid,
    created_at: String,
}

impl From<&CheckpointMarker> for CheckpointRow {
    fn from(marker: &CheckpointMarker) -> Self {
        Self {
            checkpoint_id: marker.checkpoint_id,
            commit_id: marker.commit_id,
            position: marker.position,
            folder_commit_id: marker.folder_commit_id,
            created_at: marker.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Execute checkpoint commands
pub async fn execute(
    args: &CheckpointArgs,
    ctx: &Context,
    format: OutputFormat,
) -> Result<(), AppError> {
    let pit = ctx.pit().await?;

    match &args.command {
        CheckpointCommand::List { folder } => {
            let markers = pit.history.list_checkpoints(*folder).await?;
            let rows: Vec<CheckpointRow> = markers.iter().map(CheckpointRow::from).collect();
            output::print_list(&rows, format);
        }
        CheckpointCommand::Create {
            folder,
            commit,
            force,
        } => {
            match pit
                .checkpoints
                .create_folder_checkpoint(*folder, *commit, *force)
                .await?
            {
                Some(checkpoint) => {
                    output::print_success(&format!("Checkpoint {} created", checkpoint.id))
                }
                None => output::print_warning("No checkpoint needed"),
            }
        }
        CheckpointCommand::Tree { env } => {
            match pit.checkpoints.create_folder_tree_checkpoint(*env).await? {
                Some(checkpoint) => {
                    output::print_success(&format!("Tree checkpoint {} created", checkpoint.id))
                }
                None => output::print_warning("Tree checkpoint not due"),
            }
        }
        CheckpointCommand::At { env, position } => {
            let commits = pit
                .checkpoints
                .resolve_folder_commits_at(*env, *position)
                .await?;
            match format {
                OutputFormat::Json => output::print_json(&commits),
                OutputFormat::Table => {
                    let rows: Vec<CommitRow> = commits.values().map(CommitRow::from).collect();
                    output::print_list(&rows, format);
                }
            }
        }
    }

    Ok(())
}
