//! # RepoLens CLI (`repolens`)
//!
//! The `repolens` binary drives the repository analysis pipeline: database
//! initialization, one-shot analyses, status polling, result display,
//! grounded Q&A, and the JSON HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! repolens --config ./config/repolens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repolens init` | Create the SQLite database and run schema migrations |
//! | `repolens analyze <url>` | Start an analysis for a GitHub repository |
//! | `repolens status <repo-id>` | Show the latest session status |
//! | `repolens show <repo-id>` | Print the stored analysis |
//! | `repolens ask <repo-id> "<question>"` | Ask a grounded question |
//! | `repolens compare <repo-id>...` | Compare stored analyses |
//! | `repolens serve` | Start the JSON HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use repolens::cache::Cache;
use repolens::compare::ComparisonKind;
use repolens::config;
use repolens::db;
use repolens::github::GithubClient;
use repolens::llm;
use repolens::migrate;
use repolens::orchestrate::Orchestrator;
use repolens::server;
use repolens::store::Store;

/// RepoLens — GitHub repository analysis with grounded Q&A.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/repolens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "repolens",
    about = "RepoLens — GitHub repository analysis with grounded Q&A",
    version,
    long_about = "RepoLens fetches a GitHub repository's metadata, README, file tree, and \
    issues, produces a structured analysis with a single generative-model call, persists it \
    to SQLite, and answers follow-up questions grounded in the stored analysis."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/repolens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent.
    Init,

    /// Analyze a GitHub repository.
    ///
    /// Registers the repository, opens a processing session, and runs the
    /// fetch-analyze-persist pipeline. Re-analyzing a known URL replaces
    /// the stored result.
    Analyze {
        /// Repository URL, e.g. `https://github.com/owner/repo`.
        url: String,

        /// Wait for the pipeline to finish and print the final status.
        #[arg(long)]
        wait: bool,
    },

    /// Show the latest analysis session status for a repository.
    Status {
        /// Repository id (UUID returned by `analyze`).
        repo_id: String,
    },

    /// Print the stored analysis for a completed repository.
    Show {
        /// Repository id (UUID returned by `analyze`).
        repo_id: String,
    },

    /// Ask a question grounded in a stored analysis.
    Ask {
        /// Repository id (UUID returned by `analyze`).
        repo_id: String,

        /// The question to answer.
        question: String,
    },

    /// Compare stored analyses across repositories.
    ///
    /// Requires completed analyses for at least two of the given ids.
    Compare {
        /// Repository ids (2 to 5, UUIDs returned by `analyze`).
        #[arg(num_args = 2..=5, required = true)]
        repo_ids: Vec<String>,

        /// Comparison dimension: tech_stack, architecture, or complexity.
        #[arg(long, default_value = "tech_stack")]
        kind: String,
    },

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and exposes the
    /// analyze / status / analysis / ask endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repolens=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze { url, wait } => {
            let orchestrator = build_orchestrator(&cfg).await?;
            if wait {
                let repo_id = orchestrator.run_analysis(&url).await?;
                let report = orchestrator.get_status(&repo_id).await?;
                println!("repo_id: {repo_id}");
                println!("status:  {}", report.status);
                if let Some(message) = report.error_message {
                    println!("error:   {message}");
                }
            } else {
                let ticket = orchestrator.start_analysis(&url).await?;
                println!("repo_id: {}", ticket.repo_id);
                println!("status:  {}", ticket.status);
                println!("Poll with: repolens status {}", ticket.repo_id);
                // The pipeline runs on a background task; without this the
                // process would exit before it finishes.
                loop {
                    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                    let report = orchestrator.get_status(&ticket.repo_id).await?;
                    if report.status != "processing" {
                        break;
                    }
                }
            }
        }
        Commands::Status { repo_id } => {
            let orchestrator = build_orchestrator(&cfg).await?;
            let report = orchestrator.get_status(&repo_id).await?;
            println!("repo_id:   {}", report.repo_id);
            println!("status:    {}", report.status);
            if let Some(started) = report.started_at {
                println!("started:   {}", started.to_rfc3339());
            }
            if let Some(completed) = report.completed_at {
                println!("completed: {}", completed.to_rfc3339());
            }
            if let Some(message) = report.error_message {
                println!("error:     {message}");
            }
        }
        Commands::Show { repo_id } => {
            let orchestrator = build_orchestrator(&cfg).await?;
            let analysis = orchestrator.get_analysis(&repo_id).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Ask { repo_id, question } => {
            let orchestrator = build_orchestrator(&cfg).await?;
            let record = orchestrator.ask(&repo_id, &question).await?;
            println!("{}", record.answer);
            println!("answered at: {}", record.created_at.to_rfc3339());
        }
        Commands::Compare { repo_ids, kind } => {
            let kind = ComparisonKind::parse(&kind)?;
            let orchestrator = build_orchestrator(&cfg).await?;
            let report = orchestrator.compare(&repo_ids, kind).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve => {
            let bind = cfg.server.bind.clone();
            let orchestrator = build_orchestrator(&cfg).await?;
            server::run_server(orchestrator, &bind).await?;
        }
    }

    Ok(())
}

/// Wire up the pipeline from configuration: pool, schema, cache, hosting
/// client, and generative model.
async fn build_orchestrator(cfg: &config::Config) -> anyhow::Result<Arc<Orchestrator>> {
    let pool = db::connect(cfg).await?;
    migrate::create_schema(&pool).await?;

    let store = Arc::new(Store::new(pool));
    let cache = Arc::new(Cache::new(cfg.cache.default_ttl_secs));
    let host = Arc::new(GithubClient::new(
        cfg.github.api_base.clone(),
        cfg.github.timeout_secs,
    )?);
    let model: Arc<dyn llm::TextModel> = Arc::from(llm::create_model(&cfg.llm)?);

    Ok(Orchestrator::new(store, host, model, cache, cfg.clone()))
}
