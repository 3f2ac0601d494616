//! # pdfrag CLI
//!
//! The `pdfrag` binary ingests PDF documents into a local SQLite database
//! and answers questions grounded in their content.
//!
//! ## Usage
//!
//! ```bash
//! pdfrag --config ./pdfrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfrag init` | Create the SQLite database and run schema migrations |
//! | `pdfrag ingest <paths…>` | Ingest PDF files or directories of PDFs |
//! | `pdfrag ask "<question>"` | Answer a question from the ingested corpus |
//! | `pdfrag documents` | List stored documents with page and chunk counts |
//! | `pdfrag check` | Verify the database schema is present and reachable |
//!
//! Embedding and generation calls require `OPENAI_API_KEY` in the
//! environment (or any OpenAI-compatible endpoint configured in TOML).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pdfrag::answer::OpenAiGenerator;
use pdfrag::config;
use pdfrag::embedding::OpenAiEmbedder;
use pdfrag::ingest;
use pdfrag::query;
use pdfrag::store::{SqliteStore, Store};

/// pdfrag — ask questions of your PDFs, with page-level citations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; every setting has a sensible default, so a missing file only
/// matters if you need to override one.
#[derive(Parser)]
#[command(
    name = "pdfrag",
    about = "Ingest PDFs, embed their text, and answer questions grounded in retrieved pages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./pdfrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents and chunks
    /// tables. Idempotent, safe to run repeatedly.
    Init,

    /// Ingest PDF files or directories.
    ///
    /// Directories are scanned recursively for `.pdf` files. Each file is
    /// extracted, chunked per page, embedded, and stored. A file that fails
    /// is reported and skipped; the rest of the batch continues.
    Ingest {
        /// PDF files and/or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a question of the ingested corpus.
    ///
    /// Embeds the question, retrieves the most similar chunks, and asks the
    /// generation model for an answer grounded in them. Prints the answer
    /// and the page-level citations backing it.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (overrides config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Emit the answer and citations as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List stored documents with page and chunk counts.
    Documents,

    /// Verify the database schema is present and reachable.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::default()
    };

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            store.migrate().await?;
            store.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { paths } => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            let embedder = OpenAiEmbedder::new(&cfg.embedding)?;

            let report = ingest::run_ingest(&store, &embedder, &cfg, &paths).await;

            for file in &report.succeeded {
                println!(
                    "  ok   {} ({} pages, {} chunks)",
                    file.path.display(),
                    file.pages,
                    file.chunks
                );
            }
            for failure in &report.failed {
                println!("  fail {}: {}", failure.path.display(), failure.error);
            }
            println!(
                "Ingested {} document(s), {} failure(s).",
                report.succeeded.len(),
                report.failed.len()
            );
            store.close().await;

            if report.succeeded.is_empty() && !report.failed.is_empty() {
                anyhow::bail!("all files failed to ingest");
            }
        }
        Commands::Ask {
            question,
            top_k,
            json,
        } => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            let embedder = OpenAiEmbedder::new(&cfg.embedding)?;
            let generator = OpenAiGenerator::new(&cfg.generation)?;

            let answer = query::run_query(
                &store,
                &embedder,
                &generator,
                &question,
                top_k.unwrap_or(cfg.retrieval.top_k),
                cfg.context.max_context_chars,
            )
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text);
                if !answer.citations.is_empty() {
                    println!();
                    println!("Sources:");
                    for citation in &answer.citations {
                        println!("  - {}, page {}", citation.title, citation.page);
                    }
                }
            }
            store.close().await;
        }
        Commands::Documents => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            let documents = store.list_documents().await?;

            if documents.is_empty() {
                println!("No documents ingested yet.");
            } else {
                for doc in &documents {
                    let added = chrono::DateTime::from_timestamp(doc.created_at, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| doc.created_at.to_string());
                    println!(
                        "{}  {} ({} pages, {} chunks, added {})  [{}]",
                        doc.id, doc.title, doc.total_pages, doc.chunk_count, added, doc.filename
                    );
                }
                println!("{} document(s).", documents.len());
            }
            store.close().await;
        }
        Commands::Check => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            let healthy = store.health_check().await?;
            store.close().await;
            if healthy {
                println!("Database OK: required tables present.");
            } else {
                anyhow::bail!("required tables missing; run `pdfrag init`");
            }
        }
    }

    Ok(())
}
