//! CLI for the OPQ save-page-later queue.

mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use opq_core::config;
use opq_core::coordinator::RequestCoordinator;
use opq_core::queue::{RequestQueue, SqliteStore};

use commands::{run_add, run_pause, run_remove, run_resume, run_status};

/// Top-level CLI for the OPQ save-page-later queue.
#[derive(Debug, Parser)]
#[command(name = "opq")]
#[command(about = "OPQ: background save-page-later request queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add a page to the save queue.
    Add {
        /// HTTP/HTTPS URL of the page to save.
        url: String,

        /// Client namespace recorded on the request.
        #[arg(long, default_value = "cli")]
        namespace: String,

        /// Treat the request as predictive/background work instead of
        /// user-requested (stricter gating, lower priority).
        #[arg(long)]
        background: bool,
    },

    /// Show all queued requests.
    Status {
        /// Emit machine-readable JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Pause a request by its ID.
    Pause {
        /// Request identifier.
        id: i64,
    },

    /// Resume a paused request by its ID.
    Resume {
        /// Request identifier.
        id: i64,
    },

    /// Remove a request by its ID.
    Remove {
        /// Request identifier.
        id: i64,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let store = SqliteStore::open_default().await?;
        let coordinator = RequestCoordinator::new(
            cfg.policy(),
            RequestQueue::new(Arc::new(store)),
            Arc::new(commands::NoOfflinerHere),
            Arc::new(commands::NoScheduler),
        )
        .await;

        match cli.command {
            CliCommand::Add {
                url,
                namespace,
                background,
            } => run_add(&coordinator, &url, &namespace, !background).await?,
            CliCommand::Status { json } => run_status(&coordinator, json).await?,
            CliCommand::Pause { id } => run_pause(&coordinator, id).await?,
            CliCommand::Resume { id } => run_resume(&coordinator, id).await?,
            CliCommand::Remove { id } => run_remove(&coordinator, id).await?,
        }

        Ok(())
    }
}
