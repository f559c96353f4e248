//! In-memory [`Store`] implementation for tests.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Every write
//! call is counted so tests can assert that a run performed none.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::PullRequestRecord;

use super::{Store, UpsertOutcome};

pub struct InMemoryStore {
    records: RwLock<BTreeMap<u64, PullRequestRecord>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `upsert_pr` calls received.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_pr(&self, number: u64) -> Result<Option<PullRequestRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&number).cloned())
    }

    async fn upsert_pr(&self, record: &PullRequestRecord) -> Result<UpsertOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(match records.insert(record.number, record.clone()) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        })
    }

    async fn list_prs(&self) -> Result<Vec<PullRequestRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut all: Vec<PullRequestRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.activity_date().cmp(&a.activity_date()));
        Ok(all)
    }

    async fn list_unenriched(&self, limit: Option<usize>) -> Result<Vec<u64>> {
        let numbers = self
            .list_prs()
            .await?
            .into_iter()
            .filter(|r| r.enrichment.is_none())
            .map(|r| r.number)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(numbers)
    }

    async fn count_prs(&self) -> Result<u64> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(number: u64, day: u32) -> PullRequestRecord {
        PullRequestRecord {
            number,
            title: format!("PR {}", number),
            body: String::new(),
            author: "a".into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap(),
            merged_at: None,
            base_branch: "main".into(),
            head_branch: "f".into(),
            url: String::new(),
            additions: 0,
            deletions: 0,
            changed_files: 0,
            enrichment: None,
            files: vec![],
        }
    }

    #[tokio::test]
    async fn test_upsert_classifies_and_counts_writes() {
        let store = InMemoryStore::new();
        assert_eq!(store.upsert_pr(&record(1, 1)).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_pr(&record(1, 1)).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.count_prs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = InMemoryStore::new();
        store.upsert_pr(&record(1, 1)).await.unwrap();
        store.upsert_pr(&record(2, 5)).await.unwrap();
        store.upsert_pr(&record(3, 3)).await.unwrap();
        let numbers: Vec<u64> = store.list_prs().await.unwrap().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![2, 3, 1]);
        assert_eq!(store.list_unenriched(Some(2)).await.unwrap(), vec![2, 3]);
    }
}
