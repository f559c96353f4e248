//! # PR Context CLI (`prctx`)
//!
//! The `prctx` binary drives the PR sync pipeline: database setup,
//! connectivity checks, syncing merged PRs, enrichment backfill, and
//! regeneration of per-area context documents.
//!
//! ## Usage
//!
//! ```bash
//! prctx --config ./config/prctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `prctx init` | Create the SQLite database and run schema migrations |
//! | `prctx check` | Verify gh authentication and the enrichment backend |
//! | `prctx sync` | Fetch, enrich and store merged PRs, then rewrite area documents |
//! | `prctx enrich pending` | Enrich stored PRs that have no enrichment yet |
//! | `prctx context generate` | Rewrite area documents from the stored corpus |
//! | `prctx get <number>` | Print one stored PR as JSON |
//!
//! ## Examples
//!
//! ```bash
//! # Last 90 days of merged PRs
//! prctx sync --config ./config/prctx.toml
//!
//! # Two specific PRs, re-processed even if already stored
//! prctx sync --pr 123 --pr 456 --force
//!
//! # See what a sync would do without writing anything
//! prctx sync --since 2026-01-01 --dry-run --skip-ai
//!
//! # One area document, regardless of the PR threshold
//! prctx context generate --area src/auth
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=pr_context=debug` for detail.

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pr_context::config::{self, Config};
use pr_context::context_doc::ContextGenerator;
use pr_context::enrich_cmd::{self, EnrichPendingOptions};
use pr_context::enrichment::{EnrichmentClient, Summarizer};
use pr_context::progress::ProgressMode;
use pr_context::remote::RateLimitedClient;
use pr_context::store::{SqliteStore, Store};
use pr_context::sync::{FetchStrategy, SyncOptions, SyncPipeline};
use pr_context::{db, get, migrate};

const DEFAULT_SINCE_DAYS: i64 = 90;

/// PR Context CLI: mirror merged pull requests, enrich them, and keep
/// per-area context documents up to date.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/prctx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "prctx",
    about = "PR Context: merged pull request history as per-directory context documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/prctx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Check gh authentication and that the enrichment backend answers.
    Check,

    /// Fetch merged PRs, enrich and store them, then rewrite area documents.
    ///
    /// Without `--pr`, syncs PRs merged since `--since` (default: 90 days ago).
    Sync {
        /// Sync these PR numbers instead of listing by date. Repeatable.
        #[arg(long = "pr", conflicts_with = "since")]
        prs: Vec<u64>,

        /// Only PRs merged on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of PRs to list.
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Fetch and enrich, but write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Re-process PRs that are already stored.
        #[arg(long)]
        force: bool,

        /// Store PRs without enrichment and skip the backend check.
        #[arg(long)]
        skip_ai: bool,

        /// Do not rewrite area documents after syncing.
        #[arg(long)]
        no_context: bool,

        /// Progress output on stderr. Defaults to human on a TTY, else off.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Enrichment maintenance.
    Enrich {
        #[command(subcommand)]
        action: EnrichAction,
    },

    /// Area context documents.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Print one stored PR as JSON.
    Get { number: u64 },
}

#[derive(Subcommand)]
enum EnrichAction {
    /// Enrich stored PRs that have no enrichment yet.
    Pending {
        #[arg(long)]
        limit: Option<usize>,

        /// Concurrent enrichment calls per batch (default from config).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only report how many PRs are pending.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ContextAction {
    /// Rewrite documents for every qualifying area, or just one.
    Generate {
        /// Single area (e.g. `src/auth`). Ignores the PR threshold.
        #[arg(long)]
        area: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Check => {
            let source = RateLimitedClient::from_config(&cfg.remote);
            let summarizer = build_summarizer(&cfg)?;
            let store = open_store(&cfg).await?;
            let mut pipeline = SyncPipeline::new(&source, &store);
            if let Some(s) = summarizer.as_ref() {
                pipeline = pipeline.with_summarizer(s);
            }
            pipeline.check_connectivity(false).await?;
            println!("gh: authenticated");
            match summarizer.as_ref() {
                Some(s) => println!("enrichment: {} ok", s.model_name()),
                None => println!("enrichment: disabled"),
            }
            store.close().await;
        }
        Commands::Sync {
            prs,
            since,
            limit,
            dry_run,
            force,
            skip_ai,
            no_context,
            progress,
        } => {
            let strategy = if prs.is_empty() {
                FetchStrategy::Since {
                    since: parse_since(since.as_deref())?,
                    limit,
                }
            } else {
                FetchStrategy::Numbers(prs)
            };
            let options = SyncOptions {
                strategy,
                dry_run,
                force,
                skip_ai,
                generate_context: cfg.context.enabled && !no_context,
            };
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            run_sync(&cfg, &options, mode).await?;
        }
        Commands::Enrich {
            action:
                EnrichAction::Pending {
                    limit,
                    batch_size,
                    dry_run,
                },
        } => {
            let Some(summarizer) = build_summarizer(&cfg)? else {
                bail!("Enrichment is disabled. Set [enrichment] provider in the config.");
            };
            let source = RateLimitedClient::from_config(&cfg.remote);
            let store = open_store(&cfg).await?;
            let options = EnrichPendingOptions {
                limit,
                batch_size: batch_size.unwrap_or(cfg.enrichment.batch_size),
                dry_run,
            };
            let report =
                enrich_cmd::enrich_pending(&source, &summarizer, &store, &options).await?;
            store.close().await;

            if dry_run {
                println!("enrich pending (dry-run)");
                println!("  pending: {}", report.pending);
            } else {
                println!("enrich pending");
                println!("  pending: {}", report.pending);
                println!("  enriched: {}", report.enriched);
                print_errors(&report.errors);
            }
        }
        Commands::Context {
            action: ContextAction::Generate { area },
        } => {
            let store = open_store(&cfg).await?;
            let corpus = store.list_prs().await?;
            store.close().await;
            let generator = ContextGenerator::from_config(&cfg.context);

            match area {
                Some(area) => match generator.generate_area(&corpus, &area)? {
                    Some(path) => println!("wrote {}", path.display()),
                    None => println!("no document for area '{}' (no PRs, or excluded)", area),
                },
                None => {
                    let report = generator.generate_all(&corpus);
                    println!("context generate");
                    println!("  areas detected: {}", report.areas_considered);
                    println!("  documents written: {}", report.written.len());
                    for (area, message) in &report.errors {
                        println!("  error: {}: {}", area, message);
                    }
                }
            }
        }
        Commands::Get { number } => {
            let store = open_store(&cfg).await?;
            let result = get::run_get(&store, number).await;
            store.close().await;
            result?;
        }
    }

    Ok(())
}

async fn run_sync(cfg: &Config, options: &SyncOptions, mode: ProgressMode) -> Result<()> {
    let source = RateLimitedClient::from_config(&cfg.remote);
    let summarizer = if options.skip_ai {
        None
    } else {
        build_summarizer(cfg)?
    };
    let store = open_store(cfg).await?;
    let generator = ContextGenerator::from_config(&cfg.context);

    let mut pipeline = SyncPipeline::new(&source, &store).with_context(&generator);
    if let Some(s) = summarizer.as_ref() {
        pipeline = pipeline.with_summarizer(s);
    }

    let reporter = mode.reporter();
    let result = pipeline.run(options, reporter.as_ref()).await;
    store.close().await;
    let report = result?;

    if options.dry_run {
        println!("sync (dry-run)");
    } else {
        println!("sync");
    }
    println!("  total: {}", report.total_prs);
    println!("  processed: {}", report.processed_prs);
    println!("  created: {}", report.created);
    println!("  updated: {}", report.updated);
    println!("  skipped: {}", report.skipped);
    if options.generate_context && !options.dry_run {
        println!("  context documents: {}", report.documents_written);
    }
    print_errors(&report.errors);

    let stats = source.stats().await;
    tracing::debug!(gh_calls = stats.calls, "remote client stats");
    Ok(())
}

fn print_errors(errors: &[pr_context::sync::SyncError]) {
    if errors.is_empty() {
        println!("ok");
    } else {
        println!("  errors: {}", errors.len());
        for e in errors {
            println!("    {}", e);
        }
    }
}

fn build_summarizer(cfg: &Config) -> Result<Option<EnrichmentClient>> {
    EnrichmentClient::from_config(&cfg.enrichment).context("Failed to set up enrichment backend")
}

async fn open_store(cfg: &Config) -> Result<SqliteStore> {
    let pool = db::connect(cfg).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(SqliteStore::new(pool))
}

fn parse_since(since: Option<&str>) -> Result<NaiveDate> {
    match since {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid --since date '{}', expected YYYY-MM-DD", s)),
        None => Ok((Utc::now() - Duration::days(DEFAULT_SINCE_DAYS)).date_naive()),
    }
}
