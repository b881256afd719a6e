//! # Member QA CLI (`mqa`)
//!
//! The `mqa` binary is the primary interface for Member QA. It provides
//! commands for one-shot questions, roster and corpus inspection, cache
//! refreshes, snapshot ingestion, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! mqa --config ./config/mqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mqa ask "<question>"` | Answer a question about a roster member |
//! | `mqa members` | List the member roster |
//! | `mqa stats` | Show corpus, cache, and model statistics |
//! | `mqa refresh` | Reload the corpus (`--force` hits the remote API) |
//! | `mqa snapshot init` | One-time snapshot ingestion from the remote API |
//! | `mqa serve` | Start the HTTP server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use member_qa::config::{load_config, Config};
use member_qa::engine::QaEngine;
use member_qa::generate::OllamaGenerator;
use member_qa::retrieve::Retriever;
use member_qa::roster::Roster;
use member_qa::server::run_server;
use member_qa::snapshot_cmd::run_snapshot_init;
use member_qa::store::{CorpusStore, HttpRemoteClient};
use member_qa::{embedding, models::CorpusSource};

/// Retrieval-augmented question answering over a member message corpus.
#[derive(Parser)]
#[command(
    name = "mqa",
    about = "Member QA: ask natural-language questions about roster members",
    version,
    long_about = "Member QA resolves a question to one roster member, ranks that member's \
    messages by semantic similarity, and synthesizes an answer with a language model. \
    Message data is served from an in-memory cache, a durable NDJSON snapshot, or the \
    remote messages API, in that order."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about a roster member.
    Ask {
        /// The natural-language question.
        question: String,

        /// Bypass the cache and fetch fresh data from the remote API.
        #[arg(long)]
        fresh: bool,
    },

    /// List the member roster.
    Members,

    /// Show corpus, cache, and model statistics.
    Stats,

    /// Reload the corpus into the in-memory cache.
    ///
    /// Without `--force` this re-reads the local snapshot; with it, the
    /// remote API is fetched. The snapshot file is never modified.
    Refresh {
        /// Fetch from the remote API instead of the local snapshot.
        #[arg(long)]
        force: bool,
    },

    /// Manage the durable message snapshot.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Start the HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Fetch all messages from the remote API and write the snapshot.
    ///
    /// Refuses to run if the snapshot already exists: it is the
    /// write-once baseline the service loads from on startup.
    Init,
}

fn build_engine(config: &Config) -> Result<QaEngine> {
    let roster = Roster::new(config.roster.members.clone());

    let remote = Arc::new(HttpRemoteClient::new(&config.remote)?);
    let store = CorpusStore::new(
        config.snapshot.path.clone(),
        remote,
        Duration::from_secs(config.cache.ttl_secs),
    );

    let embedder: Arc<dyn embedding::Embedder> =
        embedding::create_embedder(&config.embedding)?.into();
    let retriever = Retriever::new(
        embedder,
        config.embedding.batch_size,
        config.retrieval.top_k,
    );

    let generator = Arc::new(OllamaGenerator::new(&config.generation)?);

    Ok(QaEngine::new(
        roster,
        store,
        retriever,
        generator,
        config.retrieval.threshold,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "member_qa=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Ask { question, fresh } => {
            let engine = build_engine(&config)?;
            let result = engine.answer(&question, !fresh).await?;

            println!("{}", result.answer);
            println!();
            println!("  person:      {}", result.metadata.person.as_deref().unwrap_or("(unknown)"));
            println!("  confidence:  {:.2}", result.confidence);
            println!(
                "  messages:    {} found, {} relevant",
                result.metadata.messages_found, result.metadata.relevant_messages
            );
            println!("  method:      {}", result.metadata.retrieval_method);
            println!("  cached data: {}", result.metadata.used_cached_data);
        }

        Commands::Members => {
            let engine = build_engine(&config)?;
            let members = engine.list_members();
            println!("{} members:", members.len());
            for member in members {
                println!("  {}", member.name);
            }
        }

        Commands::Stats => {
            let engine = build_engine(&config)?;
            let stats = engine.stats().await?;

            println!("Member QA Stats");
            println!("===============");
            println!();
            println!("  Messages:    {}", stats.total_messages);
            println!("  Members:     {}", stats.total_members);
            println!("  Cache:       {}", stats.cache_state);
            println!(
                "  Generation:  {} ({})",
                stats.generation_model,
                if stats.generation_available {
                    "available"
                } else {
                    "unreachable"
                }
            );
            println!();
            println!("  Messages per member:");
            for (name, count) in &stats.member_message_counts {
                println!("    {}: {}", name, count);
            }
        }

        Commands::Refresh { force } => {
            let engine = build_engine(&config)?;
            let source = engine.refresh(force).await?;
            match source {
                CorpusSource::RemoteApi => {
                    println!("Corpus refreshed from the remote API (snapshot unchanged).")
                }
                CorpusSource::LocalFile => println!("Corpus reloaded from the local snapshot."),
                CorpusSource::CacheHit => println!("Corpus already cached and fresh."),
            }
        }

        Commands::Snapshot { action } => match action {
            SnapshotAction::Init => run_snapshot_init(&config).await?,
        },

        Commands::Serve => {
            let engine = Arc::new(build_engine(&config)?);
            run_server(&config, engine).await?;
        }
    }

    Ok(())
}
