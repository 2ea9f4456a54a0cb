//! Machine-readable run report.
//!
//! The layout follows pytest-json-report closely enough that dashboards
//! consuming either can share parsers: a summary block, one entry per case
//! and free-form environment metadata about the client under test.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commit of the client under test.
pub const CLIENT_SHA_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_CLIENT_SHA";
/// Link to that commit.
pub const CLIENT_SHA_URL_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_CLIENT_SHA_URL";
/// Link to the workflow run that produced the report.
pub const WORKFLOW_RUN_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_WORKFLOW_RUN";
/// Markdown file that GitHub Actions renders as the job summary.
pub const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";
/// Set to anything but `true` to suppress the job summary line.
pub const RENDER_SUMMARY_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_SUMMARY";

/// How one case ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseOutcome {
    /// Ran and met its expectation.
    Passed,
    /// Ran and did not, or passed while marked as an expected failure.
    Failed,
    /// Failed and was marked as an expected failure.
    Xfailed,
    /// Not run.
    Skipped,
}

impl CaseOutcome {
    /// Whether this outcome fails the run.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Result of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// Case id, e.g. `bundle::test_verify[PATH]`.
    pub nodeid: String,
    /// How it ended.
    pub outcome: CaseOutcome,
    /// Wall time in seconds.
    pub duration: f64,
    /// Failure diagnostics or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Cases considered.
    pub total: usize,
    /// Passed cases.
    pub passed: usize,
    /// Failed cases.
    pub failed: usize,
    /// Expected failures.
    pub xfailed: usize,
    /// Skipped cases.
    pub skipped: usize,
}

impl Summary {
    fn record(&mut self, outcome: CaseOutcome) {
        self.total += 1;
        match outcome {
            CaseOutcome::Passed => self.passed += 1,
            CaseOutcome::Failed => self.failed += 1,
            CaseOutcome::Xfailed => self.xfailed += 1,
            CaseOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Metadata about the client build under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEnvironment {
    /// Commit of the client under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_sha: Option<String>,
    /// Link to that commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_sha_url: Option<String>,
    /// Link to the producing workflow run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run: Option<String>,
}

impl ReportEnvironment {
    /// Reads the metadata from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Reads the metadata through `lookup`. Empty values count as unset.
    #[must_use]
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name| lookup(name).filter(|value: &String| !value.is_empty());
        Self {
            client_sha: get(CLIENT_SHA_ENV),
            client_sha_url: get(CLIENT_SHA_URL_ENV),
            workflow_run: get(WORKFLOW_RUN_ENV),
        }
    }
}

/// The full report of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Start of the run.
    pub created: DateTime<Utc>,
    /// Wall time of the run in seconds.
    pub duration: f64,
    /// Process exit code the run maps to.
    pub exitcode: i32,
    /// Counts per outcome.
    pub summary: Summary,
    /// Per-case results, in execution order.
    pub tests: Vec<CaseReport>,
    /// Client build metadata.
    pub environment: ReportEnvironment,
}

impl SuiteReport {
    /// An empty report for a run starting at `created`.
    #[must_use]
    pub fn new(created: DateTime<Utc>, environment: ReportEnvironment) -> Self {
        Self {
            created,
            duration: 0.0,
            exitcode: 0,
            summary: Summary::default(),
            tests: Vec::new(),
            environment,
        }
    }

    /// Appends one case result.
    pub fn record(
        &mut self,
        nodeid: String,
        outcome: CaseOutcome,
        duration: Duration,
        message: Option<String>,
    ) {
        self.summary.record(outcome);
        if outcome.is_failure() {
            self.exitcode = 1;
        }
        self.tests.push(CaseReport {
            nodeid,
            outcome,
            duration: duration.as_secs_f64(),
            message,
        });
    }

    /// Marks the run as finished after `elapsed`.
    pub fn finish(&mut self, elapsed: Duration) {
        self.duration = elapsed.as_secs_f64();
    }

    /// Whether no case failed.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.summary.failed == 0
    }

    /// One-line human summary, e.g. `12 passed, 1 failed, 3 skipped`.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let Summary {
            passed,
            failed,
            xfailed,
            skipped,
            ..
        } = self.summary;
        let parts: Vec<String> = [
            (passed, "passed"),
            (failed, "failed"),
            (xfailed, "xfailed"),
            (skipped, "skipped"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();
        if parts.is_empty() {
            "no cases ran".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Appends a pass/fail line to the GitHub Actions job summary, when
    /// running under Actions and the summary is not suppressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary file cannot be appended to.
    pub fn append_step_summary<F>(&self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup(RENDER_SUMMARY_ENV).is_some_and(|value| value != "true") {
            return Ok(());
        }
        let Some(path) = lookup(STEP_SUMMARY_ENV).filter(|path| !path.is_empty()) else {
            return Ok(());
        };
        let line = if self.success() {
            "🎉 sigstore-conformance exited successfully"
        } else {
            "❌ sigstore-conformance found one or more test failures"
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open job summary {path}"))?;
        writeln!(file, "{line}").with_context(|| format!("failed to write job summary {path}"))
    }
}
