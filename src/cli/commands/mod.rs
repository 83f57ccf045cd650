//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod helpers;
mod init;
mod llm;
mod match_cmd;
mod process;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "rxrecon")]
#[command(about = "Reconcile imported pharmacy inventory rows against the product registry")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL (sqlite:PATH or postgres://...), overrides config and DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Disable TLS for PostgreSQL connections
    #[arg(long, global = true)]
    no_tls: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema (safe to re-run)
    Init,

    /// Claim and reconcile one batch of pending import rows
    Process {
        /// Rows to claim in this run (default: 50, or config batch_size)
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Claimant name recorded on claimed rows (default: <hostname>-<pid>)
        #[arg(long)]
        worker_id: Option<String>,
        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show import queue counts per status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the matching tiers on one ad-hoc row without saving anything
    Match {
        /// Raw product title
        #[arg(short, long)]
        title: String,
        /// Laboratory name
        #[arg(long)]
        lab: Option<String>,
        /// Branch code
        #[arg(long)]
        branch: Option<String>,
        /// Vendor SKU
        #[arg(long)]
        sku: Option<String>,
        /// Regulatory registration number
        #[arg(short = 'r', long)]
        regulatory_code: Option<String>,
        /// Comma-separated barcodes
        #[arg(short = 'b', long)]
        barcodes: Option<String>,
    },

    /// Classification service commands
    Llm {
        #[command(subcommand)]
        command: LlmCommands,
    },
}

#[derive(Subcommand)]
enum LlmCommands {
    /// Check that the classifier is configured and reachable
    Check,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (mut settings, config) = load_settings_with_options(options).await?;

    // Flags win over config and environment
    if let Some(url) = cli.database_url {
        settings.database_url = Some(url);
    }
    if cli.no_tls {
        settings.no_tls = true;
    }

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Process {
            batch_size,
            worker_id,
            json,
        } => {
            if let Some(size) = batch_size {
                settings.batch_size = size;
            }
            if let Some(id) = worker_id {
                settings.worker_id = id;
            }
            process::cmd_process(&settings, &config, json).await
        }
        Commands::Status { json } => status::cmd_status(&settings, json).await,
        Commands::Match {
            title,
            lab,
            branch,
            sku,
            regulatory_code,
            barcodes,
        } => {
            let input = crate::models::MatchInput {
                title,
                sku,
                branch,
                lab,
                regulatory_code,
                barcodes,
            };
            match_cmd::cmd_match(&settings, &config, &input).await
        }
        Commands::Llm { command } => match command {
            LlmCommands::Check => llm::cmd_llm_check(&config).await,
        },
    }
}
