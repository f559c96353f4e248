//! Rate-limited access to merged pull requests through the `gh` CLI.
//!
//! Every outbound call goes through [`RateLimitedClient::call`], which
//! enforces a minimum interval of `60s / requests_per_minute` between
//! calls and applies a single-retry policy per failure class:
//!
//! | Failure | Action |
//! |---------|--------|
//! | rate limit | sleep the rate-limit cooldown (60s), retry once |
//! | network | sleep the network cooldown (5s), retry once |
//! | anything else | fail immediately |
//!
//! There is no backoff growth: a second failure on the same call surfaces
//! as a [`RemoteError::Cli`]. The client assumes one call in flight at a
//! time; callers must not fan calls out concurrently.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::RemoteConfig;
use crate::models::{ChangeStatus, FileChangeRecord, PrDetail, PrListPage, PrSummary, Review};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote CLI error: {0}")]
    Cli(String),

    #[error("remote CLI error: unexpected output: {0}")]
    Parse(String),

    #[error("remote CLI not authenticated: {0}")]
    NotAuthenticated(String),
}

/// Runs one CLI invocation and returns its stdout, or the failure text.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> std::result::Result<String, String>;
}

/// [`CommandRunner`] that shells out to the GitHub CLI.
pub struct GhCli {
    binary: String,
}

impl GhCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for GhCli {
    async fn run(&self, args: &[String]) -> std::result::Result<String, String> {
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.is_empty() {
                format!("{} exited with {}", self.binary, output.status)
            } else {
                stderr
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Filter for a list query.
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub limit: usize,
    pub since: Option<NaiveDate>,
    pub state: String,
}

impl ListFilter {
    pub fn merged_since(since: NaiveDate, limit: usize) -> Self {
        Self {
            limit,
            since: Some(since),
            state: "merged".to_string(),
        }
    }
}

/// The remote operations the sync pipeline depends on.
#[async_trait]
pub trait PrSource: Send + Sync {
    /// Verify the CLI is logged in.
    async fn check_auth(&self) -> Result<(), RemoteError>;

    async fn fetch_list(&self, filter: &ListFilter) -> Result<PrListPage, RemoteError>;

    /// Full PR with file changes, reviews and labels.
    async fn fetch_detail(&self, number: u64) -> Result<PrDetail, RemoteError>;
}

/// Diagnostics snapshot of the throttle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStats {
    pub calls: u64,
    pub last_call_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct CallState {
    calls: u64,
    last_call: Option<Instant>,
    last_call_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    RateLimit,
    Network,
    Other,
}

fn classify(message: &str) -> FailureClass {
    let lower = message.to_ascii_lowercase();
    if [
        "rate limit",
        "ratelimit",
        "http 429",
        "status 429",
        "status code 429",
        "too many requests",
    ]
        .iter()
        .any(|p| lower.contains(p))
    {
        FailureClass::RateLimit
    } else if [
        "network",
        "timeout",
        "timed out",
        "etimedout",
        "econnreset",
        "econnrefused",
        "connection reset",
        "connection refused",
        "could not resolve host",
    ]
    .iter()
    .any(|p| lower.contains(p))
    {
        FailureClass::Network
    } else {
        FailureClass::Other
    }
}

pub struct RateLimitedClient<R: CommandRunner = GhCli> {
    runner: R,
    repo: Option<String>,
    min_interval: Duration,
    rate_limit_cooldown: Duration,
    network_cooldown: Duration,
    state: Mutex<CallState>,
}

impl RateLimitedClient<GhCli> {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(GhCli::new(config.gh_binary.clone()), config)
    }
}

impl<R: CommandRunner> RateLimitedClient<R> {
    pub fn new(runner: R, config: &RemoteConfig) -> Self {
        let rpm = u64::from(config.requests_per_minute.max(1));
        Self {
            runner,
            repo: config.repo.clone(),
            min_interval: Duration::from_millis(60_000 / rpm),
            rate_limit_cooldown: config.rate_limit_cooldown(),
            network_cooldown: config.network_cooldown(),
            state: Mutex::new(CallState::default()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub async fn stats(&self) -> CallStats {
        let state = self.state.lock().await;
        CallStats {
            calls: state.calls,
            last_call_at: state.last_call_at,
        }
    }

    pub async fn reset_stats(&self) {
        *self.state.lock().await = CallState::default();
    }

    /// Throttled call with the single-retry-per-class policy.
    pub async fn call(&self, args: &[String]) -> Result<String, RemoteError> {
        let message = match self.execute_once(args).await {
            Ok(out) => return Ok(out),
            Err(message) => message,
        };

        let cooldown = match classify(&message) {
            FailureClass::RateLimit => {
                warn!(cooldown = ?self.rate_limit_cooldown, "rate limited, retrying once");
                self.rate_limit_cooldown
            }
            FailureClass::Network => {
                warn!(cooldown = ?self.network_cooldown, error = %message, "network error, retrying once");
                self.network_cooldown
            }
            FailureClass::Other => return Err(RemoteError::Cli(message)),
        };

        tokio::time::sleep(cooldown).await;
        self.execute_once(args).await.map_err(RemoteError::Cli)
    }

    async fn execute_once(&self, args: &[String]) -> std::result::Result<String, String> {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "throttling remote call");
                tokio::time::sleep(wait).await;
            }
        }
        state.last_call = Some(Instant::now());
        state.last_call_at = Some(Utc::now());
        state.calls += 1;
        debug!(call = state.calls, args = ?args, "remote call");

        self.runner.run(args).await
    }

    fn with_repo(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(repo) = &self.repo {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }
        args
    }

    /// Name-only diff, used when the structured file list comes back empty.
    async fn fetch_changed_paths(&self, number: u64) -> Result<Vec<String>, RemoteError> {
        let args = self.with_repo(vec![
            "pr".into(),
            "diff".into(),
            number.to_string(),
            "--name-only".into(),
        ]);
        let out = self.call(&args).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

const LIST_FIELDS: &str = "number,title,author,createdAt,mergedAt";
const DETAIL_FIELDS: &str = "number,title,body,author,createdAt,mergedAt,baseRefName,headRefName,url,additions,deletions,changedFiles,files,reviews,labels";

#[async_trait]
impl<R: CommandRunner> PrSource for RateLimitedClient<R> {
    async fn check_auth(&self) -> Result<(), RemoteError> {
        self.call(&["auth".to_string(), "status".to_string()])
            .await
            .map(|_| ())
            .map_err(|e| RemoteError::NotAuthenticated(e.to_string()))
    }

    #[instrument(skip(self), fields(limit = filter.limit))]
    async fn fetch_list(&self, filter: &ListFilter) -> Result<PrListPage, RemoteError> {
        let mut args = vec![
            "pr".to_string(),
            "list".to_string(),
            "--state".to_string(),
            filter.state.clone(),
            "--limit".to_string(),
            filter.limit.to_string(),
            "--json".to_string(),
            LIST_FIELDS.to_string(),
        ];
        if let Some(since) = filter.since {
            args.push("--search".to_string());
            args.push(format!("merged:>={}", since.format("%Y-%m-%d")));
        }
        let out = self.call(&self.with_repo(args)).await?;
        let rows: Vec<GhListItem> =
            serde_json::from_str(&out).map_err(|e| RemoteError::Parse(e.to_string()))?;

        let items: Vec<PrSummary> = rows.into_iter().map(PrSummary::from).collect();
        let has_more = items.len() == filter.limit;
        debug!(count = items.len(), has_more, "listed pull requests");
        Ok(PrListPage { items, has_more })
    }

    #[instrument(skip(self))]
    async fn fetch_detail(&self, number: u64) -> Result<PrDetail, RemoteError> {
        let args = self.with_repo(vec![
            "pr".into(),
            "view".into(),
            number.to_string(),
            "--json".into(),
            DETAIL_FIELDS.into(),
        ]);
        let out = self.call(&args).await?;
        let raw: GhDetail =
            serde_json::from_str(&out).map_err(|e| RemoteError::Parse(e.to_string()))?;
        let mut detail = PrDetail::from(raw);

        if detail.files.is_empty() && detail.changed_files > 0 {
            debug!(
                changed_files = detail.changed_files,
                "empty file list, falling back to name-only diff"
            );
            detail.files = self
                .fetch_changed_paths(number)
                .await?
                .into_iter()
                .map(|path| FileChangeRecord {
                    pr_number: number,
                    file_path: path,
                    additions: 0,
                    deletions: 0,
                    status: ChangeStatus::Modified,
                    previous_path: None,
                })
                .collect();
        }

        Ok(detail)
    }
}

// ============ gh JSON shapes ============

#[derive(Deserialize)]
struct GhAuthor {
    login: String,
}

fn login(author: Option<GhAuthor>) -> String {
    author
        .map(|a| a.login)
        .unwrap_or_else(|| "ghost".to_string())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhListItem {
    number: u64,
    title: String,
    author: Option<GhAuthor>,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
}

impl From<GhListItem> for PrSummary {
    fn from(item: GhListItem) -> Self {
        PrSummary {
            number: item.number,
            title: item.title,
            author: login(item.author),
            created_at: item.created_at,
            merged_at: item.merged_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhFile {
    path: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    change_type: Option<String>,
    #[serde(default)]
    previous_path: Option<String>,
}

#[derive(Deserialize)]
struct GhReview {
    author: Option<GhAuthor>,
    #[serde(default)]
    state: String,
}

#[derive(Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhDetail {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    author: Option<GhAuthor>,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    base_ref_name: String,
    #[serde(default)]
    head_ref_name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
    #[serde(default)]
    files: Vec<GhFile>,
    #[serde(default)]
    reviews: Vec<GhReview>,
    #[serde(default)]
    labels: Vec<GhLabel>,
}

impl From<GhDetail> for PrDetail {
    fn from(raw: GhDetail) -> Self {
        let number = raw.number;
        PrDetail {
            number,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            author: login(raw.author),
            created_at: raw.created_at,
            merged_at: raw.merged_at,
            base_branch: raw.base_ref_name,
            head_branch: raw.head_ref_name,
            url: raw.url,
            additions: raw.additions,
            deletions: raw.deletions,
            changed_files: raw.changed_files,
            files: raw
                .files
                .into_iter()
                .map(|f| FileChangeRecord {
                    pr_number: number,
                    status: f
                        .change_type
                        .as_deref()
                        .map(ChangeStatus::parse)
                        .unwrap_or(ChangeStatus::Modified),
                    file_path: f.path,
                    additions: f.additions,
                    deletions: f.deletions,
                    previous_path: f.previous_path,
                })
                .collect(),
            reviews: raw
                .reviews
                .into_iter()
                .map(|r| Review {
                    author: login(r.author),
                    state: r.state,
                })
                .collect(),
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct ScriptedRunner {
        responses: StdMutex<VecDeque<std::result::Result<String, String>>>,
        seen: StdMutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(responses: Vec<std::result::Result<&str, &str>>) -> Self {
            Self {
                responses: StdMutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                seen: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, args: &[String]) -> std::result::Result<String, String> {
            self.seen.lock().unwrap().push(args.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted response".to_string()))
        }
    }

    fn fast_config() -> RemoteConfig {
        RemoteConfig {
            repo: Some("acme/widgets".to_string()),
            requests_per_minute: 60_000,
            rate_limit_cooldown_secs: 0,
            network_cooldown_secs: 0,
            ..RemoteConfig::default()
        }
    }

    fn client(responses: Vec<std::result::Result<&str, &str>>) -> RateLimitedClient<ScriptedRunner> {
        RateLimitedClient::new(ScriptedRunner::new(responses), &fast_config())
    }

    const DETAIL_JSON: &str = r#"{
        "number": 123,
        "title": "Add login",
        "body": "Adds a login handler",
        "author": {"login": "alice"},
        "createdAt": "2026-01-02T10:00:00Z",
        "mergedAt": "2026-01-03T10:00:00Z",
        "baseRefName": "main",
        "headRefName": "feat/login",
        "url": "https://github.com/acme/widgets/pull/123",
        "additions": 10,
        "deletions": 5,
        "changedFiles": 1,
        "files": [{"path": "src/auth/login.ts", "additions": 10, "deletions": 5}],
        "reviews": [{"author": {"login": "bob"}, "state": "APPROVED"}],
        "labels": [{"name": "feature"}]
    }"#;

    #[test]
    fn test_classify_failures() {
        assert_eq!(
            classify("API rate limit exceeded for user"),
            FailureClass::RateLimit
        );
        assert_eq!(classify("HTTP 429: Too Many Requests"), FailureClass::RateLimit);
        assert_eq!(
            classify("dial tcp: i/o timeout"),
            FailureClass::Network
        );
        assert_eq!(classify("read: ECONNRESET"), FailureClass::Network);
        assert_eq!(
            classify("GraphQL: Could not resolve to a PullRequest"),
            FailureClass::Other
        );
    }

    #[test]
    fn test_min_interval_from_rate() {
        let config = RemoteConfig {
            requests_per_minute: 30,
            ..RemoteConfig::default()
        };
        let c = RateLimitedClient::new(ScriptedRunner::new(vec![]), &config);
        assert_eq!(c.min_interval(), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_rate_limit_retries_once_then_succeeds() {
        let c = client(vec![Err("API rate limit exceeded"), Ok("ok")]);
        let out = c.call(&["x".to_string()]).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(c.stats().await.calls, 2);
    }

    #[tokio::test]
    async fn test_second_rate_limit_surfaces() {
        let c = client(vec![
            Err("API rate limit exceeded"),
            Err("API rate limit exceeded"),
            Ok("never reached"),
        ]);
        let err = c.call(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().starts_with("remote CLI error: "));
        assert_eq!(c.stats().await.calls, 2);
    }

    #[tokio::test]
    async fn test_network_then_rate_limit_surfaces_after_second_failure() {
        let c = client(vec![
            Err("connection reset by peer"),
            Err("API rate limit exceeded"),
            Ok("never reached"),
        ]);
        assert!(c.call(&["x".to_string()]).await.is_err());
        assert_eq!(c.stats().await.calls, 2);
    }

    #[test]
    fn test_pr_number_containing_429_is_not_a_rate_limit() {
        for number in [429, 1429, 4290] {
            let message = format!(
                "GraphQL: Could not resolve to a PullRequest with the number of {}. (repository.pullRequest)",
                number
            );
            assert_eq!(classify(&message), FailureClass::Other);
        }
        assert_eq!(classify("HTTP 429"), FailureClass::RateLimit);
        assert_eq!(classify("gh: status 429"), FailureClass::RateLimit);
    }

    #[tokio::test]
    async fn test_not_found_for_pr_4290_fails_without_retry() {
        let c = client(vec![
            Err("GraphQL: Could not resolve to a PullRequest with the number of 4290."),
            Ok("never reached"),
        ]);
        let err = c.call(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("4290"));
        assert_eq!(c.stats().await.calls, 1);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_retry() {
        let c = client(vec![Err("no pull requests found"), Ok("never reached")]);
        let err = c.call(&["x".to_string()]).await.unwrap_err();
        assert_eq!(err.to_string(), "remote CLI error: no pull requests found");
        assert_eq!(c.stats().await.calls, 1);
    }

    #[tokio::test]
    async fn test_throttle_spaces_consecutive_calls() {
        let config = RemoteConfig {
            requests_per_minute: 600,
            ..fast_config()
        };
        let c = RateLimitedClient::new(ScriptedRunner::new(vec![Ok("a"), Ok("b")]), &config);
        let start = Instant::now();
        c.call(&[]).await.unwrap();
        c.call(&[]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_reset_clears_counters() {
        let c = client(vec![Ok("a")]);
        c.call(&[]).await.unwrap();
        let stats = c.stats().await;
        assert_eq!(stats.calls, 1);
        assert!(stats.last_call_at.is_some());
        c.reset_stats().await;
        assert_eq!(c.stats().await, CallStats::default());
    }

    #[tokio::test]
    async fn test_fetch_detail_maps_fields() {
        let c = client(vec![Ok(DETAIL_JSON)]);
        let detail = c.fetch_detail(123).await.unwrap();
        assert_eq!(detail.author, "alice");
        assert_eq!(detail.base_branch, "main");
        assert_eq!(detail.files.len(), 1);
        assert_eq!(detail.files[0].pr_number, 123);
        assert_eq!(detail.reviews[0].state, "APPROVED");
        assert_eq!(detail.labels, vec!["feature".to_string()]);

        let seen = c.runner.seen.lock().unwrap();
        assert!(seen[0].windows(2).any(|w| w[0] == "--repo" && w[1] == "acme/widgets"));
    }

    #[tokio::test]
    async fn test_empty_file_list_falls_back_to_name_only_diff() {
        let detail = DETAIL_JSON
            .replace(
                r#"[{"path": "src/auth/login.ts", "additions": 10, "deletions": 5}]"#,
                "[]",
            )
            .replace(r#""changedFiles": 1"#, r#""changedFiles": 2"#);
        let c = client(vec![Ok(&detail), Ok("src/a.rs\n\nsrc/b/c.rs\n")]);
        let detail = c.fetch_detail(123).await.unwrap();
        let paths: Vec<&str> = detail.files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.rs", "src/b/c.rs"]);
        assert!(detail.files.iter().all(|f| f.additions == 0 && f.deletions == 0));
        assert_eq!(c.stats().await.calls, 2);
    }

    #[tokio::test]
    async fn test_fetch_list_reports_has_more_when_page_full() {
        let json = r#"[
            {"number": 2, "title": "b", "author": {"login": "x"}, "createdAt": "2026-01-01T00:00:00Z", "mergedAt": "2026-01-02T00:00:00Z"},
            {"number": 1, "title": "a", "author": null, "createdAt": "2026-01-01T00:00:00Z", "mergedAt": null}
        ]"#;
        let c = client(vec![Ok(json), Ok(json)]);
        let since = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let page = c.fetch_list(&ListFilter::merged_since(since, 2)).await.unwrap();
        assert!(page.has_more);
        assert_eq!(page.items[1].author, "ghost");

        let page = c.fetch_list(&ListFilter::merged_since(since, 10)).await.unwrap();
        assert!(!page.has_more);

        let seen = c.runner.seen.lock().unwrap();
        assert!(seen[0].contains(&"merged:>=2026-01-01".to_string()));
    }

    #[tokio::test]
    async fn test_auth_failure_maps_to_not_authenticated() {
        let c = client(vec![Err("You are not logged into any GitHub hosts")]);
        assert!(matches!(
            c.check_auth().await,
            Err(RemoteError::NotAuthenticated(_))
        ));
    }
}
