//! # Codevo CLI (`codevo`)
//!
//! Repository Q&A, local-file Q&A and code generation from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! codevo --config ./config/codevo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codevo branches <repo>` | List the branches of a GitHub repository |
//! | `codevo ask --repo <url> [--branch b]` | Chat with a repository |
//! | `codevo ask --files <path>...` | Chat with local files or directories |
//! | `codevo analyze --repo <url>` | Answer three fixed overview questions |
//! | `codevo generate [--prompt p]` | Generate code, optionally in a loop |
//! | `codevo cache list` | Show cached collections |
//! | `codevo cache invalidate <name-or-key>` | Drop cached collections |
//!
//! ## Examples
//!
//! ```bash
//! # One question, no loop
//! codevo ask --repo rust-lang/log --branch master --question "How is the logger installed?"
//!
//! # Force a fresh index even if one is cached
//! codevo ask --repo rust-lang/log --branch master --rebuild
//!
//! # Verbose logs on stderr
//! RUST_LOG=codevo=debug codevo analyze --repo rust-lang/log --branch master
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use codevo::cache::CollectionCache;
use codevo::chat;
use codevo::codegen::CodeGenerator;
use codevo::config::{self, Config};
use codevo::connector_github::{self, GitHubApi, GitHubClient, RepoRef};
use codevo::connector_upload;
use codevo::embedding::{self, EmbeddingProvider};
use codevo::filter::FileFilter;
use codevo::index::Collection;
use codevo::ingest;
use codevo::llm::{self, CompletionModel};
use codevo::models::SourceSet;
use codevo::rag::RagPipeline;
use codevo::store::CollectionStore;

/// Codevo: ask questions about a GitHub repository or local files, and
/// generate code, using retrieval-augmented generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/codevo.example.toml` for a full example. A missing
/// file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "codevo",
    about = "Codevo: chat with a GitHub repository or local files, and generate code",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/codevo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Where the text comes from.
#[derive(Args)]
struct SourceArgs {
    /// GitHub repository: `https://github.com/owner/repo` or `owner/repo`.
    #[arg(long, conflicts_with = "files", required_unless_present = "files")]
    repo: Option<String>,

    /// Branch to load from the repository.
    #[arg(long, default_value = "main")]
    branch: String,

    /// Local files or directories to load instead of a repository.
    #[arg(long, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Rebuild the index even if a cached one exists.
    #[arg(long)]
    rebuild: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the branches of a GitHub repository.
    ///
    /// Also checks the configured access token, failing fast if GitHub
    /// rejects it.
    Branches {
        /// Repository URL or `owner/repo`.
        repo: String,
    },

    /// Ask questions about a repository or local files.
    ///
    /// Without `--question`, reads one question per line from stdin until
    /// EOF or `exit`. The last few exchanges are replayed with each new
    /// question.
    Ask {
        #[command(flatten)]
        source: SourceArgs,

        /// Ask a single question and exit.
        #[arg(long)]
        question: Option<String>,
    },

    /// Answer fixed questions about languages, structure and entry points.
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Generate code from a description.
    ///
    /// Without `--prompt`, reads one request per line from stdin; earlier
    /// requests and their code are replayed so follow-ups can refine them.
    Generate {
        /// Generate for a single prompt and exit.
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Inspect or clear the collection cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached collections.
    List,
    /// Remove cached collections by name (e.g. `owner/repo@main`) or key.
    Invalidate {
        target: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Branches { repo } => {
            let repo = RepoRef::parse(&repo)?;
            let client = GitHubClient::new(&cfg.github)?;
            client.validate_token().await?;
            for branch in client.list_branches(&repo).await? {
                println!("{}", branch);
            }
        }
        Commands::Ask { source, question } => {
            let (pipeline, collection) = prepare(&cfg, &source).await?;
            chat::run_ask(&pipeline, &collection, question, cfg.retrieval.history_turns).await?;
        }
        Commands::Analyze { source } => {
            let (pipeline, collection) = prepare(&cfg, &source).await?;
            chat::run_analyze(&pipeline, &collection).await?;
        }
        Commands::Generate { prompt } => {
            let llm: Arc<dyn CompletionModel> = Arc::from(llm::create_client(&cfg.llm)?);
            let generator = CodeGenerator::new(llm);
            chat::run_generate(&generator, prompt, cfg.retrieval.history_turns).await?;
        }
        Commands::Cache { action } => {
            let cache = open_cache(&cfg).await?;
            match action {
                CacheAction::List => print_cache_list(&cache).await?,
                CacheAction::Invalidate { target } => {
                    let removed = cache.invalidate(&target).await?;
                    println!("removed {} collection(s) matching '{}'", removed, target);
                }
            }
        }
    }

    Ok(())
}

async fn open_cache(cfg: &Config) -> Result<CollectionCache> {
    let store = CollectionStore::open(&cfg.cache.db_path()).await?;
    Ok(CollectionCache::with_store(store))
}

/// Load the source, build or fetch its collection, and wire the pipeline.
async fn prepare(cfg: &Config, source: &SourceArgs) -> Result<(RagPipeline, Arc<Collection>)> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(embedding::create_provider(&cfg.embedding)?);
    let llm: Arc<dyn CompletionModel> = Arc::from(llm::create_client(&cfg.llm)?);
    let cache = open_cache(cfg).await?;

    let set = load_source(cfg, source).await?;
    eprintln!("Loaded {} file(s) from {}", set.files.len(), set.name);

    let collection =
        ingest::prepare_collection(cfg, &cache, embedder.as_ref(), &set, source.rebuild).await?;

    Ok((
        RagPipeline::new(embedder, llm, cfg.retrieval.top_k),
        collection,
    ))
}

async fn load_source(cfg: &Config, source: &SourceArgs) -> Result<SourceSet> {
    let filter = FileFilter::from_config(&cfg.github)?;

    match &source.repo {
        Some(repo) => {
            let repo = RepoRef::parse(repo)?;
            let client = GitHubClient::new(&cfg.github)?;
            Ok(connector_github::load_repository(&client, &repo, &source.branch, &filter).await?)
        }
        None => connector_upload::load_uploads(&source.files, &filter),
    }
}

async fn print_cache_list(cache: &CollectionCache) -> Result<()> {
    let infos = cache.list().await?;
    if infos.is_empty() {
        println!("No cached collections.");
        return Ok(());
    }

    println!(
        "{:<14} {:<40} {:>7} {:<22} CREATED",
        "KEY", "NAME", "CHUNKS", "MODEL"
    );
    for info in infos {
        println!(
            "{:<14} {:<40} {:>7} {:<22} {}",
            &info.key[..info.key.len().min(12)],
            info.name,
            info.chunk_count,
            info.model,
            info.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
