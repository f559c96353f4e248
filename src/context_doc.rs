//! Per-area context documents.
//!
//! Each qualifying area gets `<root>/<area>/<filename>`, a Markdown file
//! summarizing the PRs that shaped that part of the tree. The heading
//! always states how many PRs exist for the area in total, even when the
//! recency window or the display cap shows fewer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Months, Utc};
use tracing::{debug, info, warn};

use crate::areas::{self, Area};
use crate::config::ContextConfig;
use crate::models::PullRequestRecord;

const MAX_FILES_SHOWN: usize = 5;
const MAX_BODY_EXCERPT_CHARS: usize = 200;

/// Rendering knobs; `now` is explicit so output is deterministic.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub recency_months: u32,
    pub max_displayed: usize,
    pub now: DateTime<Utc>,
}

/// Render the document text for one area.
pub fn render_area_document(area: &Area<'_>, options: &RenderOptions) -> String {
    let total = area.prs.len();
    let cutoff = options
        .now
        .checked_sub_months(Months::new(options.recency_months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut recent: Vec<&PullRequestRecord> = area
        .prs
        .iter()
        .copied()
        .filter(|pr| pr.activity_date() >= cutoff)
        .collect();
    recent.sort_by(|a, b| {
        b.activity_date()
            .cmp(&a.activity_date())
            .then(b.number.cmp(&a.number))
    });
    recent.truncate(options.max_displayed);

    let mut doc = String::new();
    doc.push_str(&format!("# PR Context: {}\n\n", area.key));
    doc.push_str(&format!(
        "_Generated {} from {} merged pull requests touching `{}/`._\n\n",
        options.now.format("%Y-%m-%d %H:%M UTC"),
        total,
        area.key
    ));

    doc.push_str(&format!(
        "## Recent Changes (showing {} of {} PRs, last {} months)\n\n",
        recent.len(),
        total,
        options.recency_months
    ));

    if recent.is_empty() {
        doc.push_str(&format!(
            "_No pull requests merged in the last {} months._\n\n",
            options.recency_months
        ));
    }

    for pr in &recent {
        render_pr(&mut doc, pr, &area.key);
    }

    doc.push_str("## Regenerating\n\n");
    doc.push_str("```bash\n");
    doc.push_str("# all areas\n");
    doc.push_str("prctx context generate\n");
    doc.push_str("# this area only\n");
    doc.push_str(&format!("prctx context generate --area {}\n", area.key));
    doc.push_str("```\n");

    doc
}

fn render_pr(doc: &mut String, pr: &PullRequestRecord, area_key: &str) {
    doc.push_str(&format!("### #{}: {}\n\n", pr.number, pr.title));
    doc.push_str(&format!(
        "- **Date:** {}\n",
        pr.activity_date().format("%Y-%m-%d")
    ));
    doc.push_str(&format!("- **Author:** @{}\n", pr.author));

    let prefix = format!("{}/", area_key);
    let relevant: Vec<&str> = pr
        .files
        .iter()
        .filter(|f| f.file_path.starts_with(&prefix))
        .map(|f| basename(&f.file_path))
        .collect();
    if !relevant.is_empty() {
        let shown = relevant
            .iter()
            .take(MAX_FILES_SHOWN)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        if relevant.len() > MAX_FILES_SHOWN {
            doc.push_str(&format!(
                "- **Files:** {} (+{} more)\n",
                shown,
                relevant.len() - MAX_FILES_SHOWN
            ));
        } else {
            doc.push_str(&format!("- **Files:** {}\n", shown));
        }
    }
    doc.push('\n');

    let body = pr.body.trim();
    if let Some(enrichment) = &pr.enrichment {
        doc.push_str(enrichment.why.trim());
        doc.push_str("\n\n");
    } else if !body.is_empty() && body.chars().count() < MAX_BODY_EXCERPT_CHARS {
        doc.push_str(body);
        doc.push_str("\n\n");
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Write `content` to `<root>/<area>/<filename>`, creating directories.
pub fn write_area_document(
    root: &Path,
    area_key: &str,
    filename: &str,
    content: &str,
) -> Result<PathBuf> {
    let dir = root.join(area_key);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create area directory: {}", dir.display()))?;
    let path = dir.join(filename);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write context document: {}", path.display()))?;
    Ok(path)
}

/// Outcome of one generation pass.
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub written: Vec<PathBuf>,
    pub areas_considered: usize,
    /// `(area, message)` for documents that could not be written.
    pub errors: Vec<(String, String)>,
}

/// Detects areas over a corpus and writes a document for each qualifying one.
pub struct ContextGenerator {
    root: PathBuf,
    filename: String,
    threshold: usize,
    recency_months: u32,
    max_displayed: usize,
}

impl ContextGenerator {
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            root: config.root.clone(),
            filename: config.filename.clone(),
            threshold: config.threshold,
            recency_months: config.recency_months,
            max_displayed: config.max_displayed,
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            recency_months: self.recency_months,
            max_displayed: self.max_displayed,
            now: Utc::now(),
        }
    }

    /// Full recomputation over `corpus`. A failed write is recorded and
    /// the remaining areas are still attempted.
    pub fn generate_all(&self, corpus: &[PullRequestRecord]) -> GenerationReport {
        let detected = areas::detect_areas(corpus);
        let qualifying = areas::qualifying_areas(&detected, self.threshold);
        let options = self.render_options();
        info!(
            detected = detected.len(),
            qualifying = qualifying.len(),
            "generating context documents"
        );

        let mut report = GenerationReport {
            areas_considered: detected.len(),
            ..GenerationReport::default()
        };

        for area in qualifying {
            let content = render_area_document(area, &options);
            match write_area_document(&self.root, &area.key, &self.filename, &content) {
                Ok(path) => {
                    debug!(area = %area.key, path = %path.display(), prs = area.prs.len(), "wrote context document");
                    report.written.push(path);
                }
                Err(e) => {
                    warn!(area = %area.key, error = %e, "failed to write context document");
                    report.errors.push((area.key.clone(), format!("{:#}", e)));
                }
            }
        }

        report
    }

    /// Regenerate one area. The PR-count threshold is not applied, the
    /// structural vetoes are. `Ok(None)` when the area is vetoed or has no PRs.
    pub fn generate_area(
        &self,
        corpus: &[PullRequestRecord],
        area_key: &str,
    ) -> Result<Option<PathBuf>> {
        let area_key = area_key.trim_matches('/');
        let detected = areas::detect_areas(corpus);
        let area = match detected.get(area_key) {
            Some(area) => area.clone(),
            None => single_area(corpus, area_key),
        };

        if area.prs.is_empty() || !areas::should_emit(&area.key, area.prs.len(), 1) {
            return Ok(None);
        }

        let content = render_area_document(&area, &self.render_options());
        write_area_document(&self.root, &area.key, &self.filename, &content).map(Some)
    }
}

/// Area built directly from the corpus, used when it fell below the
/// two-PR detection floor.
fn single_area<'a>(corpus: &'a [PullRequestRecord], area_key: &str) -> Area<'a> {
    let prefix = format!("{}/", area_key);
    let mut area = Area {
        key: area_key.to_string(),
        prs: Vec::new(),
        relevance: 0,
    };
    for pr in corpus {
        let touches = pr
            .files
            .iter()
            .filter(|f| f.file_path.starts_with(&prefix))
            .count();
        if touches > 0 {
            area.relevance += touches;
            area.prs.push(pr);
        }
    }
    area
}
