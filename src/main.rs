//! # docsmith CLI
//!
//! The `docsmith` binary runs the documentation generation backend. It
//! provides commands for database initialization, a connectivity check, and
//! starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! docsmith --config ./config/docsmith.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsmith init` | Create the SQLite database and run schema migrations |
//! | `docsmith status` | Run the outbound connectivity probe and print the result |
//! | `docsmith serve` | Start the HTTP API server |
//!
//! The config file is optional: every setting has a working local default,
//! and the inference endpoint/model can be overridden with the
//! `DOCSMITH_INFERENCE_URL` and `DOCSMITH_MODEL` environment variables.

mod auth;
mod config;
mod db;
mod export;
mod grounding;
mod migrate;
mod models;
mod probe;
mod prompt;
mod relay;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// docsmith — a streaming documentation generation backend for locally
/// hosted language models.
#[derive(Parser)]
#[command(
    name = "docsmith",
    about = "docsmith — a streaming documentation generation backend for locally hosted language models",
    version,
    long_about = "docsmith accepts a block of text or code, optionally grounds it with \
    reference material fetched from an external knowledge source, relays a streaming \
    generation request to a local inference server, and forwards tokens to the client \
    as they arrive. It also exports finished text as PDF and carries a minimal user store."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional; defaults apply when the file does not exist.
    #[arg(long, global = true, default_value = "./config/docsmith.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the users table. This command
    /// is idempotent — running it multiple times is safe.
    Init,

    /// Run the outbound connectivity probe and print online/offline.
    Status,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// generation, export, status, and auth endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Status => {
            let online = probe::is_online(
                &cfg.grounding.probe_addr,
                Duration::from_secs(cfg.grounding.probe_timeout_secs),
            )
            .await;
            println!("{}", if online { "online" } else { "offline" });
        }
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
