//! # Patient Search CLI (`psearch`)
//!
//! ## Usage
//!
//! ```bash
//! psearch --config ./config/psearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `psearch init` | Create the SQLite database and run schema migrations |
//! | `psearch register --user <id> <file>...` | Catalogue documents from medical filenames |
//! | `psearch search "<term>" --user <id>` | Fuzzy patient search |
//! | `psearch suggest "<partial>" --user <id>` | Autocomplete patient names |
//! | `psearch documents "<name>" --user <id>` | Documents for an exact patient name |
//! | `psearch token bearer\|signed-url\|blob <name>` | Issue a credential and print it |
//! | `psearch serve` | Start the HTTP server |
//!
//! Logs go to stderr; set `RUST_LOG` to change the filter.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use patient_search::tokens::TokenRequest;
use patient_search::{config, ingest, migrate, search, server, tokens};

/// Patient Search CLI: tenant-isolated fuzzy search over patient documents.
#[derive(Parser)]
#[command(
    name = "psearch",
    about = "Patient Search: tenant-isolated fuzzy patient name search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/psearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Register documents from medical filenames.
    ///
    /// Filenames follow `{RECORD}_{SURNAMES, NAMES}_{EPISODE}_{CATEGORY}.pdf`.
    /// Invalid names are reported and skipped.
    Register {
        /// Owning tenant.
        #[arg(long)]
        user: String,

        /// Filenames or paths to register.
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Fuzzy search by patient name.
    Search {
        term: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Minimum similarity in [0, 1].
        #[arg(long)]
        min_similarity: Option<f64>,
    },

    /// Suggest patient names for a partial term.
    Suggest {
        partial: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// List documents whose patient name matches exactly (after normalization).
    Documents {
        name: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        skip: usize,
    },

    /// Issue a credential and print it as JSON.
    Token {
        #[command(subcommand)]
        kind: TokenKind,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum TokenKind {
    /// Bearer token for the speech service.
    Bearer,
    /// Container SAS token.
    SignedUrl,
    /// Signed URL for a single blob.
    Blob { name: String },
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("patient_search=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Register { user, files } => {
            ingest::run_register(&cfg, &user, &files).await?;
        }
        Commands::Search {
            term,
            user,
            limit,
            skip,
            min_similarity,
        } => {
            search::run_search(&cfg, &term, &user, limit, skip, min_similarity).await?;
        }
        Commands::Suggest {
            partial,
            user,
            limit,
        } => {
            search::run_suggest(&cfg, &partial, &user, limit).await?;
        }
        Commands::Documents {
            name,
            user,
            limit,
            skip,
        } => {
            search::run_documents(&cfg, &name, &user, limit, skip).await?;
        }
        Commands::Token { kind } => {
            let request = match kind {
                TokenKind::Bearer => TokenRequest::Bearer,
                TokenKind::SignedUrl => TokenRequest::SignedUrl,
                TokenKind::Blob { name } => TokenRequest::Blob(name),
            };
            tokens::run_token(&cfg, request).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
