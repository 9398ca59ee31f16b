//! Background job queue commands.

use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use secrethub_core::AppError;
use secrethub_core::types::PageRequest;
use secrethub_entity::job::{Job, JobPayload};
use secrethub_worker::queue::job_for;

use super::Context;
use crate::output::{self, OutputFormat};

/// Arguments for job commands
#[derive(Debug, Args)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

/// Job subcommands
#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// List jobs, newest first
    List {
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "20")]
        page_size: u64,
    },
    /// Requeue a failed job
    Retry {
        /// Job ID
        id: Uuid,
    },
    /// Delete finished jobs older than a number of days
    Cleanup {
        #[arg(long, default_value = "7")]
        days: i64,
    },
    /// Queue a tree checkpoint evaluation for an environment
    TreeCheckpoint {
        /// Environment ID
        #[arg(long)]
        env: Uuid,
    },
}

/// Job display row
#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    id: Uuid,
    job_type: String,
    status: String,
    attempts: String,
    error: String,
    updated_at: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            status: job.status.to_string(),
            attempts: format!("{}/{}", job.attempts, job.max_attempts),
            error: job.error_message.clone().unwrap_or_default(),
            updated_at: job.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Execute job commands
pub async fn execute(args: &JobsArgs, ctx: &Context, format: OutputFormat) -> Result<(), AppError> {
    let queue = ctx.job_queue();

    match &args.command {
        JobsCommand::List { page, page_size } => {
            let page = queue.list(&PageRequest::new(*page, *page_size)).await?;
            let rows: Vec<JobRow> = page.items.iter().map(JobRow::from).collect();
            output::print_list(&rows, format);
        }
        JobsCommand::Retry { id } => {
            if queue.retry(*id).await? {
                output::print_success(&format!("Job {id} requeued"));
            } else {
                output::print_warning(&format!("Job {id} is not in a failed state"));
            }
        }
        JobsCommand::Cleanup { days } => {
            let removed = queue.cleanup(Utc::now() - Duration::days(*days)).await?;
            output::print_success(&format!("Removed {removed} finished jobs"));
        }
        JobsCommand::TreeCheckpoint { env } => {
            let job = job_for(
                &JobPayload::CreateFolderTreeCheckpoint { env_id: *env },
                ctx.config.worker.max_attempts,
            )?;
            match queue.enqueue_unique(&job).await? {
                Some(job) => output::print_success(&format!("Job {} enqueued", job.id)),
                None => output::print_warning("An evaluation is already pending"),
            }
        }
    }

    Ok(())
}
