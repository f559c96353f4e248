//! PR enrichment: turn a pull request into a why / business-impact /
//! technical-changes narrative.
//!
//! The pieces are kept apart so each can be tested on its own:
//! - [`prompt`] builds the request text.
//! - [`backend`] performs the completion call (Ollama or OpenAI-compatible).
//! - [`parse`] extracts the three sections, with fixed fallbacks.
//!
//! [`EnrichmentClient`] ties them together behind the [`Summarizer`] trait.
//! Backend failures surface as [`EnrichmentError`]; unparseable replies do not.
//! Confidence is a deterministic heuristic over the PR, not a model output.

pub mod backend;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EnrichmentConfig;
use crate::models::{EnrichmentResult, FileChangeRecord, PrDetail};

use backend::Backend;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment request failed: {0}")]
    Request(String),

    #[error("enrichment backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("enrichment backend response carried no completion text")]
    EmptyResponse,

    #[error("enrichment backend misconfigured: {0}")]
    Config(String),

    #[error("connection test failed: unexpected reply {0:?}")]
    UnexpectedReply(String),
}

/// Anything that can enrich a PR.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn summarize(&self, pr: &PrDetail) -> Result<EnrichmentResult, EnrichmentError>;

    /// Send the canned test prompt and check the reply.
    async fn test_connection(&self) -> Result<(), EnrichmentError>;
}

pub struct EnrichmentClient {
    backend: Backend,
}

impl EnrichmentClient {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// `Ok(None)` when the provider is `disabled`.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>, EnrichmentError> {
        Ok(Backend::from_config(config)?.map(Self::new))
    }
}

#[async_trait]
impl Summarizer for EnrichmentClient {
    fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    async fn summarize(&self, pr: &PrDetail) -> Result<EnrichmentResult, EnrichmentError> {
        let request = prompt::build_prompt(pr);
        let reply = self.backend.complete(&request).await?;
        debug!(pr = pr.number, reply_len = reply.len(), "enrichment reply received");
        Ok(assemble(pr, &reply, self.model_name()))
    }

    async fn test_connection(&self) -> Result<(), EnrichmentError> {
        let reply = self.backend.complete(prompt::CONNECTION_TEST_PROMPT).await?;
        if reply.contains(prompt::CONNECTION_TEST_EXPECTED) {
            Ok(())
        } else {
            Err(EnrichmentError::UnexpectedReply(reply))
        }
    }
}

/// Build the full result from a raw reply. Never fails.
pub fn assemble(pr: &PrDetail, reply: &str, model: &str) -> EnrichmentResult {
    let sections = parse::parse_sections(reply);
    EnrichmentResult {
        confidence_score: confidence_score(pr, sections.all_found),
        areas: extract_areas(&pr.files),
        why: sections.why,
        business_impact: sections.business_impact,
        technical_changes: sections.technical_changes,
        model: model.to_string(),
    }
}

/// Heuristic confidence in `[0, 1]`.
///
/// Starts at 0.5: +0.2 for a description over 50 chars, +0.1 for any
/// review, +0.1 for any label, +0.1 when every section parsed, and -0.1
/// when more than 20 files changed.
pub fn confidence_score(pr: &PrDetail, all_sections_parsed: bool) -> f64 {
    let mut score: f64 = 0.5;
    if pr.body.chars().count() > 50 {
        score += 0.2;
    }
    if !pr.reviews.is_empty() {
        score += 0.1;
    }
    if !pr.labels.is_empty() {
        score += 0.1;
    }
    if all_sections_parsed {
        score += 0.1;
    }
    if pr.files.len() > 20 {
        score -= 0.1;
    }
    (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

const MAX_TAGGED_AREAS: usize = 6;

/// Coarse area tags for an enrichment result.
///
/// Top-level directory of each path, plus keyword tags (`tests`, `docs`,
/// `config`, `api`, `ui`, `database`). Deduplicated in first-seen order,
/// at most six.
pub fn extract_areas(files: &[FileChangeRecord]) -> Vec<String> {
    let mut areas: Vec<String> = Vec::new();
    let mut push = |area: &str| {
        if !areas.iter().any(|a| a == area) {
            areas.push(area.to_string());
        }
    };

    for file in files {
        let path = file.file_path.as_str();
        if let Some((top, _)) = path.split_once('/') {
            if !top.is_empty() {
                push(top);
            }
        }

        let lower = path.to_ascii_lowercase();
        if lower.contains("test") || lower.contains("spec") {
            push("tests");
        }
        if lower.contains("doc") || lower.ends_with(".md") {
            push("docs");
        }
        if lower.contains("config") || lower.contains("setting") {
            push("config");
        }
        if lower.contains("api") || lower.contains("endpoint") {
            push("api");
        }
        if lower.contains("ui") || lower.contains("component") {
            push("ui");
        }
        if lower.contains("db") || lower.contains("migration") || lower.contains("schema") {
            push("database");
        }
    }

    areas.truncate(MAX_TAGGED_AREAS);
    areas
}

/// Enrich `prs` in chunks of `batch_size`, running each chunk concurrently
/// and joining it before the next starts.
///
/// A failed item is reported through `on_error` and left out of the
/// results; it never aborts the batch. Results keep input order.
pub async fn summarize_batch<F>(
    summarizer: &dyn Summarizer,
    prs: &[PrDetail],
    batch_size: usize,
    mut on_error: F,
) -> Vec<(u64, EnrichmentResult)>
where
    F: FnMut(u64, &EnrichmentError),
{
    let mut results = Vec::with_capacity(prs.len());

    for chunk in prs.chunks(batch_size.max(1)) {
        let outcomes = join_all(
            chunk
                .iter()
                .map(|pr| async move { (pr.number, summarizer.summarize(pr).await) }),
        )
        .await;

        for (number, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push((number, result)),
                Err(e) => {
                    warn!(pr = number, error = %e, "enrichment failed");
                    on_error(number, &e);
                }
            }
        }
    }

    results
}
