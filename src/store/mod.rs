//! Storage abstraction for PR records.
//!
//! The [`Store`] trait is the only persistence surface the sync pipeline
//! sees: existence checks, idempotent upserts, and full-corpus reads for
//! area document generation.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteStore`] | the on-disk store used by the CLI |
//! | [`InMemoryStore`] | tests and dry experimentation |
//!
//! A single store must not be written by two sync runs at once; callers
//! serialize runs against one database.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::PullRequestRecord;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Whether an upsert inserted a new record or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one record (with its file changes) by PR number.
    async fn get_pr(&self, number: u64) -> Result<Option<PullRequestRecord>>;

    /// Insert or fully replace a record and all of its file changes.
    async fn upsert_pr(&self, record: &PullRequestRecord) -> Result<UpsertOutcome>;

    /// Every stored record with file changes, newest activity first.
    async fn list_prs(&self) -> Result<Vec<PullRequestRecord>>;

    /// Numbers of records with no enrichment, newest first.
    async fn list_unenriched(&self, limit: Option<usize>) -> Result<Vec<u64>>;

    async fn count_prs(&self) -> Result<u64>;
}
