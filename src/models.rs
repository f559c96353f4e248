//! Core data models used throughout the sync pipeline.
//!
//! [`PrSummary`] and [`PrDetail`] are what the remote source hands back;
//! [`PullRequestRecord`] and [`FileChangeRecord`] are what the store keeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a file was touched by a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
            ChangeStatus::Renamed => "renamed",
        }
    }

    /// Lenient parse; accepts both store values and GitHub's upper-case
    /// `changeType` names. Anything unrecognised counts as a modification.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "added" => ChangeStatus::Added,
            "deleted" | "removed" => ChangeStatus::Deleted,
            "renamed" => ChangeStatus::Renamed,
            _ => ChangeStatus::Modified,
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (PR, path) pair. Unique on `(pr_number, file_path)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeRecord {
    pub pr_number: u64,
    pub file_path: String,
    pub additions: u64,
    pub deletions: u64,
    pub status: ChangeStatus,
    pub previous_path: Option<String>,
}

/// AI-generated rationale attached to a PR. Either fully present on a
/// record or absent; there is no partially filled form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub why: String,
    pub business_impact: String,
    pub technical_changes: String,
    pub areas: Vec<String>,
    /// Heuristic score in `[0, 1]`.
    pub confidence_score: f64,
    /// Model identifier that produced the narrative.
    pub model: String,
}

/// Canonical stored fact about one merged PR, keyed by `number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub base_branch: String,
    pub head_branch: String,
    pub url: String,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub enrichment: Option<EnrichmentResult>,
    pub files: Vec<FileChangeRecord>,
}

impl PullRequestRecord {
    pub fn from_detail(detail: &PrDetail, enrichment: Option<EnrichmentResult>) -> Self {
        Self {
            number: detail.number,
            title: detail.title.clone(),
            body: detail.body.clone(),
            author: detail.author.clone(),
            created_at: detail.created_at,
            merged_at: detail.merged_at,
            base_branch: detail.base_branch.clone(),
            head_branch: detail.head_branch.clone(),
            url: detail.url.clone(),
            additions: detail.additions,
            deletions: detail.deletions,
            changed_files: detail.changed_files,
            enrichment,
            files: detail
                .files
                .iter()
                .map(|f| FileChangeRecord {
                    pr_number: detail.number,
                    ..f.clone()
                })
                .collect(),
        }
    }

    /// Merge date when known, otherwise creation date.
    pub fn activity_date(&self) -> DateTime<Utc> {
        self.merged_at.unwrap_or(self.created_at)
    }
}

/// Lightweight row from a list query.
#[derive(Debug, Clone, PartialEq)]
pub struct PrSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// One page of list results. `has_more` is approximate: true iff the
/// page exactly filled the requested limit.
#[derive(Debug, Clone, Default)]
pub struct PrListPage {
    pub items: Vec<PrSummary>,
    pub has_more: bool,
}

/// A submitted review on a PR.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub author: String,
    pub state: String,
}

/// Full PR detail as returned by the remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct PrDetail {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub base_branch: String,
    pub head_branch: String,
    pub url: String,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub files: Vec<FileChangeRecord>,
    pub reviews: Vec<Review>,
    pub labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_status_parse_is_lenient() {
        assert_eq!(ChangeStatus::parse("ADDED"), ChangeStatus::Added);
        assert_eq!(ChangeStatus::parse("removed"), ChangeStatus::Deleted);
        assert_eq!(ChangeStatus::parse("RENAMED"), ChangeStatus::Renamed);
        assert_eq!(ChangeStatus::parse("COPIED"), ChangeStatus::Modified);
        assert_eq!(ChangeStatus::Renamed.to_string(), "renamed");
    }

    #[test]
    fn test_from_detail_stamps_pr_number_on_files() {
        let detail = PrDetail {
            number: 7,
            title: "t".into(),
            body: String::new(),
            author: "a".into(),
            created_at: Utc::now(),
            merged_at: None,
            base_branch: "main".into(),
            head_branch: "feat".into(),
            url: String::new(),
            additions: 1,
            deletions: 0,
            changed_files: 1,
            files: vec![FileChangeRecord {
                pr_number: 0,
                file_path: "src/lib.rs".into(),
                additions: 1,
                deletions: 0,
                status: ChangeStatus::Modified,
                previous_path: None,
            }],
            reviews: vec![],
            labels: vec![],
        };
        let record = PullRequestRecord::from_detail(&detail, None);
        assert_eq!(record.files[0].pr_number, 7);
        assert_eq!(record.activity_date(), detail.created_at);
    }
}
