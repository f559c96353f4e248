//! Sync orchestration.
//!
//! Drives one run end to end: connectivity check, fetch, then per PR an
//! existence check, enrichment and upsert, and finally regeneration of
//! the area documents over the whole stored corpus.
//!
//! # Failure Classes
//!
//! | Failure | Effect |
//! |---------|--------|
//! | gh not authenticated, enrichment backend unreachable | run aborts with `Err` before any fetch |
//! | one PR cannot be fetched | recorded, PR excluded, run continues |
//! | enrichment fails for one PR | recorded, PR stored without enrichment |
//! | store read/write fails for one PR | recorded, PR counted as processed |
//!
//! Callers must inspect [`RunReport::errors`] to detect partial failure.
//!
//! Per-PR work is sequential so that progress counters stay exact. Each
//! step returns a [`StepOutcome`] that is folded into the run state; the
//! reporter only ever receives snapshot copies of that state.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context_doc::ContextGenerator;
use crate::enrichment::Summarizer;
use crate::models::{PrDetail, PullRequestRecord};
use crate::progress::{ProgressReporter, RunPhase, RunProgress};
use crate::remote::{ListFilter, PrSource};
use crate::store::{Store, UpsertOutcome};

/// Which PRs a run covers.
#[derive(Debug, Clone)]
pub enum FetchStrategy {
    /// Explicit PR numbers, processed in the given order.
    Numbers(Vec<u64>),
    /// Merged on or after `since`, at most `limit`.
    Since { since: NaiveDate, limit: usize },
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub strategy: FetchStrategy,
    pub dry_run: bool,
    /// Re-process PRs that are already stored.
    pub force: bool,
    pub skip_ai: bool,
    /// Regenerate area documents after the PR loop (ignored on dry runs).
    pub generate_context: bool,
}

impl SyncOptions {
    pub fn new(strategy: FetchStrategy) -> Self {
        Self {
            strategy,
            dry_run: false,
            force: false,
            skip_ai: false,
            generate_context: true,
        }
    }
}

/// One recorded failure. `pr` is `None` for failures not tied to a PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncError {
    pub pr: Option<u64>,
    pub message: String,
}

impl SyncError {
    pub fn for_pr(pr: u64, message: impl Into<String>) -> Self {
        Self {
            pr: Some(pr),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            pr: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pr {
            Some(pr) => write!(f, "#{}: {}", pr, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Terminal summary of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub total_prs: usize,
    pub processed_prs: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub documents_written: usize,
    pub errors: Vec<SyncError>,
}

/// What happened to one PR.
#[derive(Debug)]
pub enum StepKind {
    Created,
    Updated,
    Skipped,
    /// Built but not written because of `dry_run`.
    Unwritten,
    Failed,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub pr: u64,
    pub kind: StepKind,
    pub errors: Vec<SyncError>,
}

impl StepOutcome {
    fn new(pr: u64, kind: StepKind) -> Self {
        Self {
            pr,
            kind,
            errors: Vec::new(),
        }
    }

    fn failed(pr: u64, message: String) -> Self {
        Self {
            pr,
            kind: StepKind::Failed,
            errors: vec![SyncError::for_pr(pr, message)],
        }
    }
}

/// Accumulated state of one run.
#[derive(Debug, Default)]
struct RunState {
    progress: RunProgress,
    created: usize,
    updated: usize,
    skipped: usize,
    documents_written: usize,
}

impl RunState {
    fn enter(mut self, phase: RunPhase) -> Self {
        debug_assert!(phase >= self.progress.phase);
        self.progress.phase = phase;
        self
    }

    fn fold(mut self, outcome: StepOutcome) -> Self {
        match outcome.kind {
            StepKind::Created => self.created += 1,
            StepKind::Updated => self.updated += 1,
            StepKind::Skipped => self.skipped += 1,
            StepKind::Unwritten | StepKind::Failed => {}
        }
        self.progress.processed += 1;
        self.progress.current_pr = Some(outcome.pr);
        self.progress.errors.extend(outcome.errors);
        self
    }

    fn into_report(self) -> RunReport {
        RunReport {
            total_prs: self.progress.total,
            processed_prs: self.progress.processed,
            created: self.created,
            updated: self.updated,
            skipped: self.skipped,
            documents_written: self.documents_written,
            errors: self.progress.errors,
        }
    }
}

/// A PR queued for processing.
enum Pending {
    Fetched(PrDetail),
    Listed(u64),
}

impl Pending {
    fn number(&self) -> u64 {
        match self {
            Pending::Fetched(detail) => detail.number,
            Pending::Listed(number) => *number,
        }
    }
}

/// Collaborators of a sync run. The store is shared by every run made
/// through one pipeline.
pub struct SyncPipeline<'a> {
    source: &'a dyn PrSource,
    summarizer: Option<&'a dyn Summarizer>,
    store: &'a dyn Store,
    context: Option<&'a ContextGenerator>,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(source: &'a dyn PrSource, store: &'a dyn Store) -> Self {
        Self {
            source,
            summarizer: None,
            store,
            context: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: &'a dyn Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_context(mut self, context: &'a ContextGenerator) -> Self {
        self.context = Some(context);
        self
    }

    /// Verify gh authentication and, unless AI is skipped, that the
    /// enrichment backend answers the test prompt.
    pub async fn check_connectivity(&self, skip_ai: bool) -> Result<()> {
        self.source
            .check_auth()
            .await
            .context("Remote connectivity check failed")?;

        if !skip_ai {
            if let Some(summarizer) = self.summarizer {
                summarizer
                    .test_connection()
                    .await
                    .with_context(|| {
                        format!(
                            "Enrichment backend connectivity check failed ({})",
                            summarizer.model_name()
                        )
                    })?;
            }
        }
        Ok(())
    }

    /// Run one sync. Only a failed connectivity check returns `Err`.
    pub async fn run(
        &self,
        options: &SyncOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        self.check_connectivity(options.skip_ai).await?;

        let mut state = RunState::default().enter(RunPhase::Fetching);
        reporter.report(&state.progress);

        let (queue, fetch_errors) = self.fetch(&options.strategy).await;
        state.progress.errors.extend(fetch_errors);
        state.progress.total = queue.len();
        info!(
            total = queue.len(),
            dry_run = options.dry_run,
            force = options.force,
            "sync fetch complete"
        );

        state = state.enter(RunPhase::Processing);
        reporter.report(&state.progress);

        for pending in queue {
            state.progress.current_pr = Some(pending.number());
            reporter.report(&state.progress);

            let outcome = self.process(pending, options).await;
            debug!(pr = outcome.pr, kind = ?outcome.kind, "processed PR");
            state = state.fold(outcome);
            reporter.report(&state.progress);
        }

        if options.generate_context && !options.dry_run {
            if let Some(generator) = self.context {
                state = state.enter(RunPhase::Storing);
                state.progress.current_pr = None;
                reporter.report(&state.progress);
                state = self.regenerate_documents(generator, state).await;
            }
        }

        state = state.enter(RunPhase::Complete);
        state.progress.current_pr = None;
        reporter.report(&state.progress);

        let report = state.into_report();
        info!(
            processed = report.processed_prs,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "sync complete"
        );
        Ok(report)
    }

    async fn fetch(&self, strategy: &FetchStrategy) -> (Vec<Pending>, Vec<SyncError>) {
        let mut queue = Vec::new();
        let mut errors = Vec::new();

        match strategy {
            FetchStrategy::Numbers(numbers) => {
                for &number in numbers {
                    match self.source.fetch_detail(number).await {
                        Ok(detail) => queue.push(Pending::Fetched(detail)),
                        Err(e) => {
                            warn!(pr = number, error = %e, "failed to fetch PR");
                            errors.push(SyncError::for_pr(number, e.to_string()));
                        }
                    }
                }
            }
            FetchStrategy::Since { since, limit } => {
                let filter = ListFilter::merged_since(*since, *limit);
                match self.source.fetch_list(&filter).await {
                    Ok(page) => {
                        if page.has_more {
                            info!(limit, "PR list filled the limit; older PRs were not fetched");
                        }
                        queue.extend(page.items.iter().map(|s| Pending::Listed(s.number)));
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to list PRs");
                        errors.push(SyncError::general(e.to_string()));
                    }
                }
            }
        }

        (queue, errors)
    }

    async fn process(&self, pending: Pending, options: &SyncOptions) -> StepOutcome {
        let number = pending.number();

        let existing = match self.store.get_pr(number).await {
            Ok(existing) => existing.is_some(),
            Err(e) => return StepOutcome::failed(number, format!("{:#}", e)),
        };
        if existing && !options.force {
            return StepOutcome::new(number, StepKind::Skipped);
        }

        let detail = match pending {
            Pending::Fetched(detail) => detail,
            Pending::Listed(_) => match self.source.fetch_detail(number).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(pr = number, error = %e, "failed to fetch PR");
                    return StepOutcome::failed(number, e.to_string());
                }
            },
        };

        let mut errors = Vec::new();
        let enrichment = match (options.skip_ai, self.summarizer) {
            (false, Some(summarizer)) => match summarizer.summarize(&detail).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(pr = number, error = %e, "enrichment failed, storing without it");
                    errors.push(SyncError::for_pr(number, e.to_string()));
                    None
                }
            },
            _ => None,
        };

        let record = PullRequestRecord::from_detail(&detail, enrichment);

        let kind = if options.dry_run {
            StepKind::Unwritten
        } else {
            match self.store.upsert_pr(&record).await {
                Ok(UpsertOutcome::Created) => StepKind::Created,
                Ok(UpsertOutcome::Updated) => StepKind::Updated,
                Err(e) => {
                    errors.push(SyncError::for_pr(number, format!("{:#}", e)));
                    StepKind::Failed
                }
            }
        };

        StepOutcome { pr: number, kind, errors }
    }

    async fn regenerate_documents(
        &self,
        generator: &ContextGenerator,
        mut state: RunState,
    ) -> RunState {
        let corpus = match self.store.list_prs().await {
            Ok(corpus) => corpus,
            Err(e) => {
                state.progress.errors.push(SyncError::general(format!(
                    "failed to load PRs for context documents: {:#}",
                    e
                )));
                return state;
            }
        };

        let generated = generator.generate_all(&corpus);
        state.documents_written = generated.written.len();
        state
            .progress
            .errors
            .extend(generated.errors.into_iter().map(|(area, message)| {
                SyncError::general(format!("context document for {}: {}", area, message))
            }));
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_counts_and_advances() {
        let state = RunState::default()
            .enter(RunPhase::Processing)
            .fold(StepOutcome::new(1, StepKind::Created))
            .fold(StepOutcome::new(2, StepKind::Skipped))
            .fold(StepOutcome::failed(3, "boom".into()))
            .fold(StepOutcome::new(4, StepKind::Unwritten));

        assert_eq!(state.progress.processed, 4);
        assert_eq!(state.progress.current_pr, Some(4));
        let report = state.into_report();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.errors, vec![SyncError::for_pr(3, "boom")]);
    }

    #[test]
    fn test_sync_error_display() {
        assert_eq!(SyncError::for_pr(7, "x").to_string(), "#7: x");
        assert_eq!(SyncError::general("y").to_string(), "y");
    }
}
