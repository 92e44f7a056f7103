//! # fieldqc CLI (`fqc`)
//!
//! The `fqc` binary drives the order pipeline: database initialization,
//! fetching and reconciling orders for a date range, importing them,
//! inspecting the database, and starting the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! fqc --config ./config/fieldqc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fqc init` | Create the SQLite database and run schema migrations |
//! | `fqc fetch --from D --to D` | Fetch, reconcile, filter, and dedup orders |
//! | `fqc import <file>` | Import canonical orders from a JSON file |
//! | `fqc stats` | Show order counts and last import |
//! | `fqc serve` | Start the HTTP API server |
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. `RUST_LOG` overrides the
//! default filter; `FIELDQC_LOG_FORMAT=json` switches to JSON lines.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fieldqc::config;
use fieldqc::import::{import_orders, print_summary, read_orders_file};
use fieldqc::pipeline::{run_fetch, FetchCommand};
use fieldqc::progress::ProgressMode;
use fieldqc::remote_store::HttpImportStore;
use fieldqc::sqlite_store::SqliteOrderStore;
use fieldqc::{db, migrate, server, stats};
use fieldqc_core::store::OrderStore;

/// fieldqc: bulk order ingestion and reconciliation for field-service QC.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fieldqc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fqc",
    about = "fieldqc: bulk order ingestion and reconciliation for field-service QC",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fieldqc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `qc_orders` table.
    /// Running it more than once is safe.
    Init,

    /// Fetch and reconcile orders for a date range.
    ///
    /// Dates are local calendar dates unless `--utc` is given.
    Fetch {
        /// First day of the range (YYYY-MM-DD).
        #[arg(long)]
        from: NaiveDate,

        /// Last day of the range (YYYY-MM-DD), inclusive.
        #[arg(long)]
        to: NaiveDate,

        /// Treat `--from`/`--to` as UTC dates.
        #[arg(long)]
        utc: bool,

        /// Completion statuses to keep. Repeatable; defaults to the config.
        #[arg(long = "status")]
        statuses: Vec<String>,

        /// Write the full fetch report as JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Import the resulting orders into the database.
        #[arg(long)]
        import: bool,

        /// Progress output on stderr. Defaults to human on a TTY, off otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Import canonical orders from a JSON file.
    ///
    /// Accepts either a bare array of orders or a report written by
    /// `fqc fetch --output`.
    Import {
        file: PathBuf,

        /// Send batches to a remote `/orders/import-batch` endpoint instead
        /// of the local database.
        #[arg(long)]
        remote: Option<String>,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show database statistics.
    Stats,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

/// Initializes the tracing subscriber. Logs go to stderr so stdout stays
/// parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fieldqc=info,fieldqc_core=info,warn"));

    let use_json = std::env::var("FIELDQC_LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Fetch {
            from,
            to,
            utc,
            statuses,
            output,
            import,
            progress,
        } => {
            let command = FetchCommand {
                from,
                to,
                utc,
                statuses,
                output: output.as_deref(),
                import,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            run_fetch(&cfg, command, &cancel).await?;
        }
        Commands::Import {
            file,
            remote,
            progress,
        } => {
            let orders = read_orders_file(&file)?;
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();

            let store: Box<dyn OrderStore> = match remote {
                Some(url) => Box::new(HttpImportStore::new(
                    url,
                    Duration::from_secs(cfg.provider.completion_timeout_secs),
                )?),
                None => {
                    let pool = db::connect(&cfg).await?;
                    migrate::apply(&pool).await?;
                    Box::new(SqliteOrderStore::new(pool))
                }
            };

            let result = import_orders(
                store.as_ref(),
                &orders,
                cfg.pipeline.import_batch_size,
                &cancel,
                reporter.as_ref(),
            )
            .await;
            print_summary(&result);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, cancel).await?;
        }
    }

    Ok(())
}
