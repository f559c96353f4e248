//! # PR Context
//!
//! Mirrors a repository's merged pull requests into a local store, enriches
//! each one with an AI-written "why / business impact / technical changes"
//! narrative, and writes a Markdown context document into every directory
//! that has seen enough PR activity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  gh CLI     │──▶│    Sync     │──▶│  SQLite  │
//! │ rate-limited│   │ check+enrich│   │  Store   │
//! └─────────────┘   └──────┬──────┘   └────┬─────┘
//!                          │               │
//!                   ┌──────▼──────┐   ┌────▼─────┐
//!                   │ Ollama /    │   │  Areas   │
//!                   │ OpenAI      │   │ + docs   │
//!                   └─────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! prctx init                        # create database
//! prctx check                       # gh auth + enrichment backend
//! prctx sync --since 2026-01-01     # mirror merged PRs
//! prctx sync --pr 123 --pr 456      # specific PRs
//! prctx enrich pending              # backfill missing enrichment
//! prctx context generate            # rewrite area documents
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | PR records and remote wire types |
//! | [`remote`] | Rate-limited `gh` client |
//! | [`enrichment`] | Prompting, completion backends, reply parsing |
//! | [`areas`] | Area detection and the emission gate |
//! | [`context_doc`] | Area document rendering and writing |
//! | [`store`] | Store trait, SQLite and in-memory backends |
//! | [`sync`] | Sync orchestration |
//! | [`progress`] | Run progress reporting |
//! | [`enrich_cmd`] | Enrichment backfill |
//! | [`get`] | Stored PR lookup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod areas;
pub mod config;
pub mod context_doc;
pub mod db;
pub mod enrich_cmd;
pub mod enrichment;
pub mod get;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod remote;
pub mod store;
pub mod sync;
