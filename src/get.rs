//! Stored PR retrieval by number.
//!
//! Used by the `prctx get` CLI command.

use anyhow::{bail, Result};

use crate::models::PullRequestRecord;
use crate::store::Store;

/// Fetch one stored record, failing when it does not exist.
pub async fn get_pr(store: &dyn Store, number: u64) -> Result<PullRequestRecord> {
    match store.get_pr(number).await? {
        Some(record) => Ok(record),
        None => bail!("PR not found in store: #{}", number),
    }
}

/// CLI entry point: print the record as pretty JSON on stdout.
pub async fn run_get(store: &dyn Store, number: u64) -> Result<()> {
    let record = get_pr(store, number).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
