//! Area partitioning of the PR corpus.
//!
//! An area is a directory prefix of 1 to 3 segments (`src`, `src/auth`,
//! `src/auth/handlers`). Every changed file contributes all of its
//! prefixes, so areas nest and overlap by design. Areas are recomputed
//! from the full corpus on every run and have no identity beyond their key.

use std::collections::{BTreeMap, HashSet};

use crate::models::PullRequestRecord;

const MAX_AREA_DEPTH: usize = 3;
const MIN_AREA_PRS: usize = 2;

const GENERIC_ROOTS: [&str; 3] = ["src", "lib", "."];
const EXCLUDED_SEGMENTS: [&str; 3] = ["node_modules", "dist", "build"];

/// One area and the PRs that touched it.
#[derive(Debug, Clone)]
pub struct Area<'a> {
    pub key: String,
    /// Distinct PRs, in corpus order.
    pub prs: Vec<&'a PullRequestRecord>,
    /// Number of file changes that fell inside the area, counting repeats.
    pub relevance: usize,
}

/// Directory prefixes of `path`, shallowest first.
///
/// The final segment is the file itself and never becomes a candidate;
/// a prefix containing a `.` stops the walk.
pub fn candidate_areas(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let max_depth = segments.len().saturating_sub(1).min(MAX_AREA_DEPTH);

    let mut candidates = Vec::with_capacity(max_depth);
    for depth in 1..=max_depth {
        let candidate = segments[..depth].join("/");
        if candidate.contains('.') {
            break;
        }
        candidates.push(candidate);
    }
    candidates
}

/// Map every area touched by at least two distinct PRs to those PRs.
pub fn detect_areas(prs: &[PullRequestRecord]) -> BTreeMap<String, Area<'_>> {
    let mut areas: BTreeMap<String, Area<'_>> = BTreeMap::new();
    let mut seen: HashSet<(String, u64)> = HashSet::new();

    for pr in prs {
        for file in &pr.files {
            for key in candidate_areas(&file.file_path) {
                let area = areas.entry(key.clone()).or_insert_with(|| Area {
                    key: key.clone(),
                    prs: Vec::new(),
                    relevance: 0,
                });
                area.relevance += 1;
                if seen.insert((key, pr.number)) {
                    area.prs.push(pr);
                }
            }
        }
    }

    areas.retain(|_, area| area.prs.len() >= MIN_AREA_PRS);
    areas
}

/// Whether an area deserves its own context document.
///
/// Every check is an independent veto: too few PRs, a generic root
/// (`src`, `lib`, `.`), a hidden segment, or a vendored/build output
/// directory each suppress emission on their own.
pub fn should_emit(area: &str, pr_count: usize, threshold: usize) -> bool {
    let area = area.trim_end_matches('/');
    if area.is_empty() || pr_count < threshold {
        return false;
    }
    if GENERIC_ROOTS.contains(&area) {
        return false;
    }
    if area.starts_with('.') || area.contains("/.") {
        return false;
    }
    !area
        .split('/')
        .any(|segment| EXCLUDED_SEGMENTS.contains(&segment))
}

/// Areas that pass [`should_emit`], in key order.
pub fn qualifying_areas<'m, 'a>(
    areas: &'m BTreeMap<String, Area<'a>>,
    threshold: usize,
) -> Vec<&'m Area<'a>> {
    areas
        .values()
        .filter(|area| should_emit(&area.key, area.prs.len(), threshold))
        .collect()
}
