//! # MD&A Harness CLI (`mdna`)
//!
//! ## Usage
//!
//! ```bash
//! mdna --config ./config/mdna.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mdna analyze <file>` | Run the full pipeline and print the report |
//! | `mdna metrics <file>` | Print schema hints and metrics as JSON |
//! | `mdna chunks <file>` | List the chunks fed to retrieval |
//! | `mdna serve` | Start the HTTP service |
//!
//! Without `--config`, `./config/mdna.toml` is used when it exists and the
//! built-in defaults otherwise. Logging is controlled by `RUST_LOG`.

use clap::{Parser, Subcommand};
use mdna_harness::analyze::{self, OutputFormat};
use mdna_harness::{config, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MD&A Harness: Management Discussion & Analysis reports from financial
/// tables.
#[derive(Parser)]
#[command(
    name = "mdna",
    about = "Generate MD&A reports from CSV, TSV and XLSX financial tables",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/mdna.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a table and generate the report.
    ///
    /// Uses the configured embedding and language-model providers when
    /// available, and falls back to first-k retrieval and the template
    /// narrative otherwise.
    Analyze {
        /// Table file (.csv, .tsv, .txt, .xlsx).
        file: PathBuf,

        /// Output format: `json` (full payload) or `markdown` (report only).
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Write the result to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print schema hints and computed metrics as JSON.
    Metrics {
        /// Table file (.csv, .tsv, .txt, .xlsx).
        file: PathBuf,
    },

    /// List the chunks the table is split into.
    Chunks {
        /// Table file (.csv, .tsv, .txt, .xlsx).
        file: PathBuf,
    },

    /// Start the HTTP service.
    ///
    /// Binds to `[server].bind` and serves `POST /api/analyze`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            file,
            format,
            output,
        } => {
            analyze::run_analyze(&cfg, &file, format, output.as_deref()).await?;
        }
        Commands::Metrics { file } => {
            analyze::run_metrics(&cfg, &file)?;
        }
        Commands::Chunks { file } => {
            analyze::run_chunks(&cfg, &file)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
