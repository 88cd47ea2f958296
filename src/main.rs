//! # groundwork CLI (`gw`)
//!
//! The `gw` binary drives both pipelines: indexing and searching a text
//! corpus, and resolving and grading cited student responses against it.
//!
//! ## Usage
//!
//! ```bash
//! gw --config ./config/groundwork.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the vector table |
//! | `gw catalog` | Print the numbered corpus catalog |
//! | `gw index` | Chunk, embed and store the corpus |
//! | `gw search "<query>"` | Rank stored chunks against a query |
//! | `gw resolve <input>` | Attach a source citation to every response |
//! | `gw grade <input>` | Grade responses against their cited sources |
//! | `gw export` | Dump the vector table as JSON |
//!
//! ## Examples
//!
//! ```bash
//! gw index --config ./config/groundwork.toml
//! gw search "adding people to a late project" --answer
//! gw resolve responses.json --output responses_with_citations.json
//! gw grade responses_with_citations.json --output responses_graded.json
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=groundwork=debug` to see prompts and replies.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use groundwork::{cite, config, corpus, export, grade, ingest, migrate, search};

/// groundwork: citation-grounded retrieval and grading over a text corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/groundwork.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gw",
    about = "groundwork: citation-grounded retrieval and grading over a text corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/groundwork.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector table schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Print the numbered list of corpus files.
    ///
    /// This is the exact numbering shown to the model during citation lookup.
    Catalog,

    /// Chunk, embed and store every corpus file.
    ///
    /// Unchanged chunks keep their stored vectors.
    Index {
        /// Drop every stored vector and re-embed the whole corpus.
        #[arg(long)]
        rebuild: bool,

        /// Show file and chunk counts without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Rank stored chunks by similarity to a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Generate an answer grounded in the returned chunks.
        #[arg(long)]
        answer: bool,
    },

    /// Resolve each response's free-text citation to a corpus file.
    Resolve {
        /// Response dataset (JSON).
        input: PathBuf,

        /// Where to write the result. Defaults to overwriting the input.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Re-resolve responses that already have a citation.
        #[arg(long)]
        force: bool,
    },

    /// Grade each response against the source it cites.
    Grade {
        /// Response dataset (JSON) with citations.
        input: PathBuf,

        /// Where to write the result. Defaults to overwriting the input.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Re-grade responses that already have a successful grade.
        #[arg(long)]
        regrade: bool,
    },

    /// Export the vector table as JSON.
    Export {
        /// Output file. Writes to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("groundwork=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Vector table initialized.");
        }
        Commands::Catalog => {
            corpus::run_catalog(&cfg.corpus)?;
        }
        Commands::Index { rebuild, dry_run } => {
            ingest::run_index(&cfg, rebuild, dry_run).await?;
        }
        Commands::Search {
            query,
            top_k,
            answer,
        } => {
            search::run_search(&cfg, &query, top_k, answer).await?;
        }
        Commands::Resolve {
            input,
            output,
            force,
        } => {
            cite::run_resolve(&cfg, &input, output.as_deref(), force).await?;
        }
        Commands::Grade {
            input,
            output,
            regrade,
        } => {
            grade::run_grade(&cfg, &input, output.as_deref(), regrade).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
    }

    Ok(())
}
