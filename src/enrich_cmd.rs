//! Backfill of missing enrichment.
//!
//! Finds stored PRs without enrichment, re-fetches their details (one at a
//! time, through the rate-limited client), enriches them in concurrent
//! batches and writes the enriched records back. Items whose fetch or
//! enrichment fails stay unenriched and are picked up by the next run.

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::enrichment::{self, Summarizer};
use crate::models::{PrDetail, PullRequestRecord};
use crate::remote::PrSource;
use crate::store::Store;
use crate::sync::SyncError;

#[derive(Debug, Clone)]
pub struct EnrichPendingOptions {
    pub limit: Option<usize>,
    pub batch_size: usize,
    pub dry_run: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct EnrichPendingReport {
    pub pending: usize,
    pub enriched: usize,
    pub errors: Vec<SyncError>,
}

pub async fn enrich_pending(
    source: &dyn PrSource,
    summarizer: &dyn Summarizer,
    store: &dyn Store,
    options: &EnrichPendingOptions,
) -> Result<EnrichPendingReport> {
    let numbers = store.list_unenriched(options.limit).await?;
    let mut report = EnrichPendingReport {
        pending: numbers.len(),
        ..EnrichPendingReport::default()
    };

    if options.dry_run || numbers.is_empty() {
        return Ok(report);
    }

    let mut details: Vec<PrDetail> = Vec::with_capacity(numbers.len());
    for number in numbers {
        match source.fetch_detail(number).await {
            Ok(detail) => details.push(detail),
            Err(e) => {
                warn!(pr = number, error = %e, "failed to fetch PR for enrichment");
                report.errors.push(SyncError::for_pr(number, e.to_string()));
            }
        }
    }

    let mut failures = Vec::new();
    let results = enrichment::summarize_batch(summarizer, &details, options.batch_size, |n, e| {
        failures.push(SyncError::for_pr(n, e.to_string()))
    })
    .await;
    report.errors.extend(failures);

    for (number, result) in results {
        let Some(detail) = details.iter().find(|d| d.number == number) else {
            continue;
        };
        let record = PullRequestRecord::from_detail(detail, Some(result));
        match store.upsert_pr(&record).await {
            Ok(_) => report.enriched += 1,
            Err(e) => report
                .errors
                .push(SyncError::for_pr(number, format!("{:#}", e))),
        }
    }

    info!(
        pending = report.pending,
        enriched = report.enriched,
        errors = report.errors.len(),
        "enrichment backfill complete"
    );
    Ok(report)
}
