//! Sync run progress reporting.
//!
//! The orchestrator hands a [`RunProgress`] snapshot to a
//! [`ProgressReporter`] on every state transition. Snapshots are owned
//! copies; reporters never see the orchestrator's live state.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use serde::Serialize;

use crate::sync::SyncError;

/// Phase of a sync run. Phases only move forward within one run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Listing or fetching PRs from the remote. Total may be unknown.
    Fetching,
    /// Per-PR check, enrichment and upsert.
    Processing,
    /// Regenerating area documents after the PR loop.
    Storing,
    Complete,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Fetching => "fetching",
            RunPhase::Processing => "processing",
            RunPhase::Storing => "storing",
            RunPhase::Complete => "complete",
        }
    }
}

/// A snapshot of one run's progress.
#[derive(Clone, Debug, Serialize)]
pub struct RunProgress {
    pub phase: RunPhase,
    pub total: usize,
    pub processed: usize,
    pub current_pr: Option<u64>,
    pub errors: Vec<SyncError>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Fetching,
            total: 0,
            processed: 0,
            current_pr: None,
            errors: Vec::new(),
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives progress snapshots. Called from the sync pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: &RunProgress);
}

impl<F> ProgressReporter for F
where
    F: Fn(&RunProgress) + Send + Sync,
{
    fn report(&self, progress: &RunProgress) {
        self(progress)
    }
}

/// Human-friendly progress on stderr: "sync  processing  12 / 100 PRs  (#4521)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, progress: &RunProgress) {
        let mut line = match progress.phase {
            RunPhase::Fetching => "sync  fetching...".to_string(),
            RunPhase::Complete => format!(
                "sync  complete  {} / {} PRs",
                format_number(progress.processed as u64),
                format_number(progress.total as u64)
            ),
            phase => format!(
                "sync  {}  {} / {} PRs",
                phase.as_str(),
                format_number(progress.processed as u64),
                format_number(progress.total as u64)
            ),
        };
        if let Some(pr) = progress.current_pr {
            line.push_str(&format!("  (#{})", pr));
        }
        if !progress.errors.is_empty() {
            line.push_str(&format!("  [{} errors]", progress.errors.len()));
        }
        line.push('\n');
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, progress: &RunProgress) {
        let obj = serde_json::json!({
            "event": "progress",
            "phase": progress.phase,
            "processed": progress.processed,
            "total": progress.total,
            "current_pr": progress.current_pr,
            "errors": progress.errors.len(),
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: &RunProgress) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(RunPhase::Fetching < RunPhase::Processing);
        assert!(RunPhase::Processing < RunPhase::Storing);
        assert!(RunPhase::Storing < RunPhase::Complete);
    }

    #[test]
    fn test_closures_are_reporters() {
        let seen = Mutex::new(Vec::new());
        let reporter = |p: &RunProgress| seen.lock().unwrap().push(p.phase);
        reporter.report(&RunProgress::new());
        assert_eq!(*seen.lock().unwrap(), vec![RunPhase::Fetching]);
    }

    #[test]
    fn test_json_phase_is_lowercase() {
        let value = serde_json::to_value(RunPhase::Processing).unwrap();
        assert_eq!(value, serde_json::json!("processing"));
    }
}
