//! Folder state comparison commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use secrethub_core::AppError;
use secrethub_service::ResourceChange;

use super::Context;
use crate::output::{self, OutputFormat};

/// Arguments for diff commands
#[derive(Debug, Args)]
pub struct DiffArgs {
    #[command(subcommand)]
    pub command: DiffCommand,
}

/// Diff subcommands
#[derive(Debug, Subcommand)]
pub enum DiffCommand {
    /// Changes that turn a folder's state at `current` into its state at `target`
    Folder {
        /// Folder commit to move to
        #[arg(long)]
        target: Uuid,
        /// Folder commit to move from (everything is a create when omitted)
        #[arg(long)]
        current: Option<Uuid>,
    },
    /// Preview a deep rollback of a folder and its descendants
    Deep {
        /// Folder commit to roll back to
        #[arg(long)]
        target: Uuid,
        /// Environment ID
        #[arg(long)]
        env: Uuid,
    },
}

/// Difference display row
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct DiffRow {
    change: String,
    kind: String,
    name: String,
    resource_id: Uuid,
    from: String,
    to: i32,
}

impl From<&ResourceChange> for DiffRow {
    fn from(change: &ResourceChange) -> Self {
        Self {
            change: change.change_type.to_string(),
            kind: change.kind.to_string(),
            name: change.name.clone(),
            resource_id: change.resource_id,
            from: output::or_dash(change.from_version),
            to: change.version,
        }
    }
}

pub(crate) fn diff_rows(changes: &[ResourceChange]) -> Vec<DiffRow> {
    changes.iter().map(DiffRow::from).collect()
}

/// Execute diff commands
pub async fn execute(args: &DiffArgs, ctx: &Context, format: OutputFormat) -> Result<(), AppError> {
    let pit = ctx.pit().await?;

    match &args.command {
        DiffCommand::Folder { target, current } => {
            let changes = pit.rollback.compare_folder_states(*target, *current).await?;
            match format {
                OutputFormat::Json => output::print_json(&changes),
                OutputFormat::Table => output::print_list(&diff_rows(&changes), format),
            }
        }
        DiffCommand::Deep { target, env } => {
            let folders = pit.rollback.deep_compare_folder(*target, *env).await?;
            match format {
                OutputFormat::Json => output::print_json(&folders),
                OutputFormat::Table => {
                    if folders.is_empty() {
                        println!("No differences.");
                    }
                    for folder in &folders {
                        let suffix = if folder.recreated { " (recreated)" } else { "" };
                        println!("{} [{}]{}", folder.folder_name, folder.folder_id, suffix);
                        output::print_list(&diff_rows(&folder.changes), format);
                    }
                }
            }
        }
    }

    Ok(())
}
