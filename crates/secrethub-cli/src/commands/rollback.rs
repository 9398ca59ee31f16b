//! Rollback, deep rollback and revert commands.

use clap::{Args, Subcommand};
use uuid::Uuid;

use secrethub_core::AppError;
use secrethub_service::{ApplyOutcome, ApplyRequest, DeepRollbackRequest};

use super::diff::diff_rows;
use super::{Context, actor};
use crate::output::{self, OutputFormat};

/// Arguments for rollback commands
#[derive(Debug, Args)]
pub struct RollbackArgs {
    #[command(subcommand)]
    pub command: RollbackCommand,

    /// Project whose secret cache is invalidated
    #[arg(long, global = true)]
    pub project: Option<Uuid>,

    /// Acting user (platform when omitted)
    #[arg(long, global = true)]
    pub user: Option<Uuid>,

    /// Commit message
    #[arg(short, long, global = true)]
    pub message: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,
}

/// Rollback subcommands
#[derive(Debug, Subcommand)]
pub enum RollbackCommand {
    /// Restore one folder to its state at a commit
    Folder {
        /// Folder commit to roll back to
        #[arg(long)]
        target: Uuid,
    },
    /// Restore a folder and its descendants to a commit
    Deep {
        /// Folder commit to roll back to
        #[arg(long)]
        target: Uuid,
        /// Environment ID
        #[arg(long)]
        env: Uuid,
    },
    /// Undo the changes of a single commit
    Revert {
        /// Folder commit to revert
        #[arg(long)]
        commit: Uuid,
    },
}

/// Execute rollback commands
pub async fn execute(
    args: &RollbackArgs,
    ctx: &Context,
    format: OutputFormat,
) -> Result<(), AppError> {
    let project_id = args
        .project
        .ok_or_else(|| AppError::bad_request("--project is required"))?;
    let pit = ctx.pit().await?;
    let actor = actor(args.user);

    match &args.command {
        RollbackCommand::Folder { target } => {
            let target = pit.history.get_commit(*target).await?.commit;
            let latest = pit.history.latest_commit(target.folder_id).await?;
            let differences = pit
                .rollback
                .compare_folder_states(target.id, latest.map(|c| c.id))
                .await?;

            if differences.is_empty() {
                output::print_warning("Folder already matches the target commit");
                return Ok(());
            }
            if format == OutputFormat::Table {
                output::print_list(&diff_rows(&differences), format);
            }
            let prompt = format!("Apply {} changes?", differences.len());
            if !output::confirm(&prompt, args.yes)? {
                println!("Cancelled.");
                return Ok(());
            }

            let outcome = pit
                .rollback
                .apply_folder_state_differences(ApplyRequest {
                    differences,
                    actor,
                    message: args.message.clone(),
                    folder_id: target.folder_id,
                    project_id,
                    reconstruct_new_folders: true,
                    reconstruct_up_to: Some(target.position),
                })
                .await?;
            report_apply(&outcome, format);
        }
        RollbackCommand::Deep { target, env } => {
            let preview = pit.rollback.deep_compare_folder(*target, *env).await?;
            let changes: usize = preview.iter().map(|f| f.changes.len()).sum();
            let prompt = format!(
                "Roll back {} folders ({} changes)?",
                preview.len(),
                changes
            );
            if !output::confirm(&prompt, args.yes)? {
                println!("Cancelled.");
                return Ok(());
            }

            let outcome = pit
                .rollback
                .deep_rollback_folder(DeepRollbackRequest {
                    target_commit_id: *target,
                    env_id: *env,
                    actor,
                    project_id,
                    message: args.message.clone(),
                })
                .await?;
            match format {
                OutputFormat::Json => output::print_json(&outcome),
                OutputFormat::Table => {
                    for folder in &outcome.folders {
                        output::print_kv(
                            &folder.folder_name,
                            &format!("{} changes", folder.outcome.total_changes),
                        );
                    }
                    output::print_success(&format!(
                        "Deep rollback applied {} changes",
                        outcome.total_changes()
                    ));
                }
            }
        }
        RollbackCommand::Revert { commit } => {
            if !output::confirm(&format!("Revert commit {commit}?"), args.yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            let outcome = pit
                .rollback
                .revert_commit_changes(*commit, actor, project_id, args.message.clone())
                .await?;
            match format {
                OutputFormat::Json => output::print_json(&outcome),
                OutputFormat::Table if outcome.changes_reverted == 0 => {
                    output::print_warning("Nothing left to revert")
                }
                OutputFormat::Table => output::print_success(&format!(
                    "Reverted {} changes (commit {})",
                    outcome.changes_reverted,
                    output::or_dash(outcome.commit.map(|c| c.id))
                )),
            }
        }
    }

    Ok(())
}

fn report_apply(outcome: &ApplyOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(outcome),
        OutputFormat::Table => {
            output::print_kv("Secret changes", &outcome.secret_changes.to_string());
            output::print_kv("Folder changes", &outcome.folder_changes.to_string());
            output::print_success(&format!(
                "Rollback committed as {}",
                output::or_dash(outcome.commit.as_ref().map(|c| c.id))
            ));
        }
    }
}
