//! # Workspace RAG CLI (`wrag`)
//!
//! The `wrag` binary drives ingestion and retrieval against a local SQLite
//! database.
//!
//! ## Usage
//!
//! ```bash
//! wrag --config ./config/wrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wrag init` | Create the SQLite database and run schema migrations |
//! | `wrag ingest <path> --workspace <id>` | Ingest a file or directory |
//! | `wrag reprocess <file-id>` | Re-run the pipeline for a stored file |
//! | `wrag delete <file-id>` | Delete a file and its chunks |
//! | `wrag files --workspace <id>` | List files in a workspace |
//! | `wrag show <file-id>` | Print a file's metadata and chunks |
//! | `wrag search "<query>" --workspace <id>` | Nearest-chunk retrieval |
//! | `wrag stats` | Per-workspace counts |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use workspace_rag::progress::ProgressMode;
use workspace_rag::{config, files, ingest, migrate, search, stats};

/// Workspace RAG CLI: workspace-scoped file ingestion and retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/wrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "wrag",
    about = "Workspace RAG: workspace-scoped file ingestion and retrieval",
    version,
    long_about = "Workspace RAG extracts text from uploaded files, splits it into overlapping \
    chunks, embeds each chunk, and stores everything in SQLite scoped to a workspace. \
    Search ranks a workspace's chunks by cosine distance to the query."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `files` / `file_items`
    /// tables. Idempotent.
    Init,

    /// Ingest a file, or every matching file under a directory.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Workspace that owns the ingested files.
        #[arg(long, short)]
        workspace: String,

        /// Declared type (MIME type or extension) overriding the file
        /// extension. Applies to every file in the run.
        #[arg(long = "type")]
        declared_type: Option<String>,

        /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Re-run extraction, chunking and embedding for a stored file,
    /// replacing its chunks.
    Reprocess {
        /// File UUID.
        id: String,
    },

    /// Delete a file and all of its chunks.
    Delete {
        /// File UUID.
        id: String,
    },

    /// List files in a workspace.
    Files {
        #[arg(long, short)]
        workspace: String,

        #[arg(long)]
        json: bool,
    },

    /// Print a file's metadata and all of its chunks.
    Show {
        /// File UUID.
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Retrieve the chunks nearest to a query within a workspace.
    Search {
        /// The search query string.
        query: String,

        #[arg(long, short)]
        workspace: String,

        /// Number of results. Defaults to `retrieval.default_k`, capped at
        /// `retrieval.max_k`.
        #[arg(long, short)]
        k: Option<usize>,

        /// Restrict results to this file. Repeatable.
        #[arg(long = "file")]
        files: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show per-workspace file and chunk counts.
    Stats {
        /// Only this workspace.
        #[arg(long, short)]
        workspace: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            workspace,
            declared_type,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, &path, &workspace, declared_type.as_deref(), progress)
                .await?;
        }
        Commands::Reprocess { id } => {
            ingest::run_reprocess(&cfg, &id).await?;
        }
        Commands::Delete { id } => {
            ingest::run_delete(&cfg, &id).await?;
        }
        Commands::Files { workspace, json } => {
            files::run_files(&cfg, &workspace, json).await?;
        }
        Commands::Show { id, json } => {
            files::run_show(&cfg, &id, json).await?;
        }
        Commands::Search {
            query,
            workspace,
            k,
            files,
            json,
        } => {
            search::run_search(&cfg, &workspace, &query, k, files, json).await?;
        }
        Commands::Stats { workspace, json } => {
            stats::run_stats(&cfg, workspace.as_deref(), json).await?;
        }
    }

    Ok(())
}
