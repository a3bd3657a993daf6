//! # SyncHub CLI (`synchub`)
//!
//! The `synchub` binary is the primary interface for SyncHub. It provides
//! commands for database initialization, syncing HR sources, importing CSV
//! files, asking questions about the stored data, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! synchub --config ./config/synchub.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `synchub init` | Create the SQLite database and run schema migrations |
//! | `synchub sources` | List registered sources and their record counts |
//! | `synchub mapping <source>` | Print the inferred field mapping for a source |
//! | `synchub sync <source\|all>` | Map, normalize, and upsert a source's records |
//! | `synchub import <file> --source <name>` | Import a CSV file as a source |
//! | `synchub stats` | Employee counts by department, location, and source |
//! | `synchub ask "<question>"` | Answer a question from the stored employees |
//! | `synchub logs` | Show recently answered questions |
//! | `synchub serve` | Start the HTTP server |
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG` to adjust
//! (default `synchub=info,tower_http=info`). Command output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synchub::{agent, config, db, ingest, loaders, migrate, query_log, server, stats};

/// SyncHub CLI: unify employee records from heterogeneous HR sources.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/synchub.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "synchub",
    about = "SyncHub — unify employee records from heterogeneous HR sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/synchub.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// List registered sources.
    Sources,

    /// Infer and print the field mapping for one source.
    Mapping {
        /// Registered source name (e.g. `FakeSAP`).
        source: String,
    },

    /// Map, normalize, and upsert records from a source.
    Sync {
        /// A registered source name, or `all`.
        source: String,
    },

    /// Import a CSV file (header row first) as a named source.
    Import {
        /// Path to the CSV file.
        file: PathBuf,

        /// Source name to import under.
        #[arg(long)]
        source: String,
    },

    /// Show employee statistics.
    Stats,

    /// Ask a natural-language question about the stored employees.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Show recently answered questions, newest first.
    Logs {
        /// Maximum number of entries (defaults to `[logs].page_size`).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synchub=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            loaders::list_sources(&cfg).await?;
        }
        Commands::Mapping { source } => {
            ingest::run_mapping(&cfg, &source).await?;
        }
        Commands::Sync { source } => {
            ingest::run_sync(&cfg, &source).await?;
        }
        Commands::Import { file, source } => {
            ingest::run_import(&cfg, &file, &source).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Ask { question } => {
            agent::run_ask(&cfg, &question).await?;
        }
        Commands::Logs { limit } => {
            query_log::run_logs(&cfg, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
