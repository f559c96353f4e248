use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn prctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("prctx");
    path
}

fn pr_123_json() -> String {
    let merged = chrono::Utc::now() - chrono::Duration::days(10);
    let created = merged - chrono::Duration::days(1);
    serde_json::json!({
        "number": 123,
        "title": "Refresh session tokens before expiry",
        "body": "Users were logged out mid-session when their token expired.",
        "author": {"login": "alice"},
        "createdAt": created.to_rfc3339(),
        "mergedAt": merged.to_rfc3339(),
        "baseRefName": "main",
        "headRefName": "fix/session-refresh",
        "url": "https://github.com/acme/app/pull/123",
        "additions": 10,
        "deletions": 5,
        "changedFiles": 1,
        "files": [{"path": "src/auth/session.ts", "additions": 10, "deletions": 5}],
        "reviews": [{"author": {"login": "bob"}, "state": "APPROVED"}],
        "labels": [{"name": "auth"}]
    })
    .to_string()
}

/// Stand-in for `gh`: authenticated, knows PR #123 only.
#[cfg(unix)]
fn write_fake_gh(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
case "$1 $2" in
  "auth status") exit 0 ;;
  "pr view")
    if [ "$3" = "123" ]; then
      cat <<'EOF'
{}
EOF
      exit 0
    fi
    echo "no pull requests found for $3" >&2
    exit 1 ;;
  "pr list") echo "[]" ; exit 0 ;;
esac
echo "unexpected gh invocation: $*" >&2
exit 1
"#,
        pr_123_json()
    );
    let path = dir.join("fake-gh");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(not(unix))]
fn write_fake_gh(_dir: &Path) -> PathBuf {
    PathBuf::from("gh")
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("repo")).unwrap();
    let gh = write_fake_gh(&root);

    let config_content = format!(
        r#"[db]
path = "{root}/data/prctx.sqlite"

[remote]
gh_binary = "{gh}"
requests_per_minute = 6000
rate_limit_cooldown_secs = 0
network_cooldown_secs = 0

[enrichment]
provider = "disabled"

[context]
root = "{root}/repo"
"#,
        root = root.display(),
        gh = gh.display()
    );

    let config_path = config_dir.join("prctx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_prctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = prctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run prctx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_prctx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/prctx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_prctx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_prctx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_prctx(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_pr_and_since_conflict() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_prctx(
        &config_path,
        &["sync", "--pr", "123", "--since", "2026-01-01"],
    );
    assert!(!success, "--pr and --since must be mutually exclusive");
}

#[test]
fn test_invalid_since_rejected() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_prctx(&config_path, &["sync", "--since", "last tuesday"]);
    assert!(!success);
    assert!(stderr.contains("YYYY-MM-DD"));
}

#[test]
fn test_get_missing_pr() {
    let (_tmp, config_path) = setup_test_env();

    run_prctx(&config_path, &["init"]);
    let (_, stderr, success) = run_prctx(&config_path, &["get", "42"]);
    assert!(!success);
    assert!(stderr.contains("PR not found"));
}

#[test]
fn test_context_generate_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_prctx(&config_path, &["init"]);
    let (stdout, stderr, success) = run_prctx(&config_path, &["context", "generate"]);
    assert!(success, "context generate failed: {}", stderr);
    assert!(stdout.contains("documents written: 0"));
}

#[cfg(unix)]
#[test]
fn test_check_reports_status() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_prctx(&config_path, &["check"]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("gh: authenticated"));
    assert!(stdout.contains("enrichment: disabled"));
}

#[cfg(unix)]
#[test]
fn test_sync_then_skip_then_get() {
    let (_tmp, config_path) = setup_test_env();

    run_prctx(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_prctx(&config_path, &["sync", "--pr", "123", "--progress", "off"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("processed: 1"));
    assert!(stdout.contains("created: 1"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) =
        run_prctx(&config_path, &["sync", "--pr", "123", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("created: 0"));
    assert!(stdout.contains("updated: 0"));
    assert!(stdout.contains("skipped: 1"));

    let (stdout, _, success) = run_prctx(&config_path, &["get", "123"]);
    assert!(success);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["number"], 123);
    assert_eq!(record["author"], "alice");
    assert_eq!(record["files"][0]["file_path"], "src/auth/session.ts");
    assert!(record["enrichment"].is_null());
}

#[cfg(unix)]
#[test]
fn test_sync_partial_failure_is_reported() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_prctx(
        &config_path,
        &["sync", "--pr", "123", "--pr", "999", "--progress", "off"],
    );
    assert!(success, "partial failure must not fail the run: {}", stderr);
    assert!(stdout.contains("total: 1"));
    assert!(stdout.contains("errors: 1"));
    assert!(stdout.contains("#999: remote CLI error: "));
}

#[cfg(unix)]
#[test]
fn test_sync_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_prctx(
        &config_path,
        &["sync", "--pr", "123", "--dry-run", "--progress", "off"],
    );
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("processed: 1"));

    let (_, _, success) = run_prctx(&config_path, &["get", "123"]);
    assert!(!success, "dry run must not store the PR");
}

#[cfg(unix)]
#[test]
fn test_context_generate_single_area() {
    let (tmp, config_path) = setup_test_env();

    run_prctx(&config_path, &["sync", "--pr", "123", "--progress", "off"]);

    let (stdout, stderr, success) =
        run_prctx(&config_path, &["context", "generate", "--area", "src/auth"]);
    assert!(success, "context generate failed: {}", stderr);
    assert!(stdout.contains("wrote"));

    let doc = fs::read_to_string(tmp.path().join("repo/src/auth/PR_CONTEXT.md")).unwrap();
    assert!(doc.contains("# PR Context: src/auth"));
    assert!(doc.contains("showing 1 of 1 PRs"));
    assert!(doc.contains("### #123: Refresh session tokens before expiry"));
    assert!(doc.contains("prctx context generate --area src/auth"));
}
