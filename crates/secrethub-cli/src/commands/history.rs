//! Folder commit history commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use secrethub_core::AppError;
use secrethub_core::types::PageRequest;
use secrethub_entity::commit::{FolderCommit, ResolvedChange};

use super::Context;
use crate::output::{self, OutputFormat};

/// Arguments for history commands
#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommand,
}

/// History subcommands
#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List a folder's commits, newest first
    List {
        /// Folder ID
        #[arg(long)]
        folder: Uuid,
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "20")]
        page_size: u64,
    },
    /// Show one commit and its changes
    Show {
        /// Folder commit ID
        commit: Uuid,
    },
    /// Show a folder's resources as of a commit
    State {
        /// Folder ID
        #[arg(long)]
        folder: Uuid,
        /// Folder commit ID (latest when omitted)
        #[arg(long)]
        commit: Option<Uuid>,
    },
}

/// Commit display row
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct CommitRow {
    id: Uuid,
    folder_id: Uuid,
    #[tabled(rename = "seq")]
    commit_id: i64,
    position: i64,
    actor: String,
    message: String,
    created_at: String,
}

impl From<&FolderCommit> for CommitRow {
    fn from(commit: &FolderCommit) -> Self {
        let actor = match commit.actor_name() {
            Some(name) => format!("{} ({})", commit.actor_type, name),
            None => commit.actor_type.to_string(),
        };
        Self {
            id: commit.id,
            folder_id: commit.folder_id,
            commit_id: commit.commit_id,
            position: commit.position,
            actor,
            message: commit.message.clone().unwrap_or_default(),
            created_at: commit.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Commit change display row
#[derive(Debug, Serialize, Tabled)]
struct ChangeRow {
    change: String,
    kind: String,
    name: String,
    version: i32,
    version_id: Uuid,
}

impl From<&ResolvedChange> for ChangeRow {
    fn from(change: &ResolvedChange) -> Self {
        Self {
            change: change.change_type.to_string(),
            kind: change.resource.kind.to_string(),
            name: change.resource.name.clone(),
            version: change.resource.version,
            version_id: change.resource.version_id,
        }
    }
}

/// Folder state display row
#[derive(Debug, Serialize, Tabled)]
struct StateRow {
    kind: String,
    resource_id: Uuid,
    name: String,
    version: i32,
    #[tabled(rename = "since seq")]
    commit_id: i64,
}

/// Execute history commands
pub async fn execute(
    args: &HistoryArgs,
    ctx: &Context,
    format: OutputFormat,
) -> Result<(), AppError> {
    let pit = ctx.pit().await?;

    match &args.command {
        HistoryCommand::List {
            folder,
            page,
            page_size,
        } => {
            let page = pit
                .history
                .list_commits(*folder, &PageRequest::new(*page, *page_size))
                .await?;
            let rows: Vec<CommitRow> = page.items.iter().map(CommitRow::from).collect();
            output::print_list(&rows, format);
            if format == OutputFormat::Table {
                println!(
                    "Page {}/{} ({} commits)",
                    page.page, page.total_pages, page.total_items
                );
            }
        }
        HistoryCommand::Show { commit } => {
            let details = pit.history.get_commit(*commit).await?;
            match format {
                OutputFormat::Json => output::print_json(&details),
                OutputFormat::Table => {
                    let row = CommitRow::from(&details.commit);
                    output::print_kv("Commit", &row.id.to_string());
                    output::print_kv("Folder", &row.folder_id.to_string());
                    output::print_kv("Sequence", &row.commit_id.to_string());
                    output::print_kv("Actor", &row.actor);
                    output::print_kv("Message", &row.message);
                    output::print_kv("Created", &row.created_at);
                    output::print_kv("Latest", &details.is_latest.to_string());
                    let changes: Vec<ChangeRow> =
                        details.changes.iter().map(ChangeRow::from).collect();
                    output::print_list(&changes, format);
                }
            }
        }
        HistoryCommand::State { folder, commit } => {
            let reconstruction = pit.history.folder_state(*folder, *commit).await?;
            let rows: Vec<StateRow> = reconstruction
                .state
                .iter()
                .map(|entry| StateRow {
                    kind: entry.resource.kind.to_string(),
                    resource_id: entry.resource.resource_id,
                    name: entry.resource.name.clone(),
                    version: entry.resource.version,
                    commit_id: entry.commit_id,
                })
                .collect();
            if format == OutputFormat::Table {
                output::print_kv("At sequence", &reconstruction.commit_id.to_string());
                output::print_kv("Checkpoint", &output::or_dash(reconstruction.checkpoint_id));
                output::print_kv(
                    "Replayed commits",
                    &reconstruction.replayed_commits.to_string(),
                );
            }
            output::print_list(&rows, format);
        }
    }

    Ok(())
}
