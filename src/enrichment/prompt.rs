//! Prompt construction for PR enrichment.

use crate::models::PrDetail;

use super::parse::{BUSINESS_IMPACT_HEADER, TECHNICAL_CHANGES_HEADER, WHY_HEADER};

/// Canned prompt used by the connectivity check.
pub const CONNECTION_TEST_PROMPT: &str = "Reply with the single word OK.";

/// Substring a healthy backend must return for [`CONNECTION_TEST_PROMPT`].
pub const CONNECTION_TEST_EXPECTED: &str = "OK";

const MAX_BODY_CHARS: usize = 4000;
const MAX_FILES_LISTED: usize = 50;

/// Build the single enrichment prompt for one PR.
pub fn build_prompt(pr: &PrDetail) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are documenting the history of a codebase. Explain why the following merged \
         pull request was made.\n\n",
    );

    prompt.push_str(&format!("Title: {}\n", pr.title));
    prompt.push_str(&format!("Author: {}\n", pr.author));
    prompt.push_str(&format!(
        "Branches: {} -> {}\n",
        pr.head_branch, pr.base_branch
    ));

    prompt.push_str("\nDescription:\n");
    if pr.body.trim().is_empty() {
        prompt.push_str("(no description provided)\n");
    } else {
        let body: String = pr.body.chars().take(MAX_BODY_CHARS).collect();
        prompt.push_str(body.trim());
        prompt.push('\n');
    }

    prompt.push_str(&format!("\nFiles changed ({}):\n", pr.files.len()));
    for file in pr.files.iter().take(MAX_FILES_LISTED) {
        prompt.push_str(&format!(
            "- {} ({}, +{} -{})\n",
            file.file_path, file.status, file.additions, file.deletions
        ));
    }
    if pr.files.len() > MAX_FILES_LISTED {
        prompt.push_str(&format!(
            "- ... and {} more\n",
            pr.files.len() - MAX_FILES_LISTED
        ));
    }

    if !pr.reviews.is_empty() {
        let states: Vec<String> = pr
            .reviews
            .iter()
            .map(|r| format!("{} ({})", r.author, r.state))
            .collect();
        prompt.push_str(&format!("\nReviews: {}\n", states.join(", ")));
    }

    if !pr.labels.is_empty() {
        prompt.push_str(&format!("Labels: {}\n", pr.labels.join(", ")));
    }

    prompt.push_str(&format!(
        "\nRespond using exactly these three sections, each starting with its header on a new line:\n\
         {WHY_HEADER} <the motivation for the change, 1-3 sentences>\n\
         {BUSINESS_IMPACT_HEADER} <the effect on users or the business, 1-2 sentences>\n\
         {TECHNICAL_CHANGES_HEADER} <the key technical changes, as a short bullet list>\n"
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeStatus, FileChangeRecord, Review};
    use chrono::Utc;

    fn pr() -> PrDetail {
        PrDetail {
            number: 9,
            title: "Cache tokens".into(),
            body: String::new(),
            author: "carol".into(),
            created_at: Utc::now(),
            merged_at: None,
            base_branch: "main".into(),
            head_branch: "cache".into(),
            url: String::new(),
            additions: 3,
            deletions: 1,
            changed_files: 1,
            files: vec![FileChangeRecord {
                pr_number: 9,
                file_path: "src/auth/cache.rs".into(),
                additions: 3,
                deletions: 1,
                status: ChangeStatus::Added,
                previous_path: None,
            }],
            reviews: vec![Review {
                author: "dave".into(),
                state: "APPROVED".into(),
            }],
            labels: vec!["perf".into()],
        }
    }

    #[test]
    fn test_prompt_embeds_pr_facts_and_headers() {
        let prompt = build_prompt(&pr());
        assert!(prompt.contains("Title: Cache tokens"));
        assert!(prompt.contains("Branches: cache -> main"));
        assert!(prompt.contains("(no description provided)"));
        assert!(prompt.contains("- src/auth/cache.rs (added, +3 -1)"));
        assert!(prompt.contains("dave (APPROVED)"));
        assert!(prompt.contains("Labels: perf"));
        for header in [WHY_HEADER, BUSINESS_IMPACT_HEADER, TECHNICAL_CHANGES_HEADER] {
            assert!(prompt.contains(header));
        }
    }
}
