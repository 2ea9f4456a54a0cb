//! Executes the scenario catalogue and classifies each case.
//!
//! Per case the runner:
//!
//! 1. applies the skip rules (signing disabled, staging unsupported, id
//!    filter)
//! 2. obtains an identity token if the scenario signs; token failures abort
//!    the whole run
//! 3. enters a fresh [`Workspace`] seeded with the assets
//! 4. runs the body and classifies the result against the expected-failure
//!    list
//!
//! Expected failures are strict: a case listed in `xfail` that passes is
//! reported as failed.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use chrono::Utc;
use conformance_core::client::{CommandRunner, ContainerRunner, LocalRunner};
use conformance_core::identity::{Clock, IdentityTokenProvider, TokenSource};
use conformance_core::{HarnessConfig, SigstoreClient, Workspace};
use tracing::{debug, info, warn};

use super::report::{CaseOutcome, ReportEnvironment, SuiteReport};
use super::{Case, ScenarioContext, all_cases};

/// Why a case was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The scenario signs and signing is disabled.
    SigningSkipped,
    /// The scenario does not support staging.
    NotStaging,
}

impl SkipReason {
    /// Message recorded in the report.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SigningSkipped => "skipping test that requires signing",
            Self::NotStaging => "skipping test that doesn't support staging",
        }
    }
}

/// Whether `case` must be skipped under `config`.
#[must_use]
pub fn skip_reason(config: &HarnessConfig, case: &Case) -> Option<SkipReason> {
    if config.skip_signing && case.scenario.signing {
        Some(SkipReason::SigningSkipped)
    } else if config.staging() && !case.scenario.staging {
        Some(SkipReason::NotStaging)
    } else {
        None
    }
}

/// Maps a case result to its reported outcome and message.
#[must_use]
pub fn classify(result: &Result<()>, xfail: bool) -> (CaseOutcome, Option<String>) {
    match (result, xfail) {
        (Ok(()), false) => (CaseOutcome::Passed, None),
        (Ok(()), true) => (
            CaseOutcome::Failed,
            Some("[XPASS(strict)] test passed but is marked as an expected failure".to_string()),
        ),
        (Err(err), false) => (CaseOutcome::Failed, Some(format!("{err:#}"))),
        (Err(err), true) => (CaseOutcome::Xfailed, Some(format!("{err:#}"))),
    }
}

/// Whether `case` matches a `-k` style filter: a plain substring of the id.
#[must_use]
pub fn matches_filter(case: &Case, filter: Option<&str>) -> bool {
    filter.is_none_or(|filter| case.id().contains(filter))
}

/// Drives every selected case against one client.
pub struct SuiteRunner<'a, S, C> {
    config: &'a HarnessConfig,
    entrypoint: OsString,
    assets_dir: PathBuf,
    provider: &'a IdentityTokenProvider<S, C>,
    filter: Option<String>,
}

impl<'a, S: TokenSource, C: Clock> SuiteRunner<'a, S, C> {
    /// Creates a runner. `entrypoint` must already be resolved and
    /// `assets_dir` absolute, since cases change the working directory.
    #[must_use]
    pub fn new(
        config: &'a HarnessConfig,
        entrypoint: OsString,
        assets_dir: PathBuf,
        provider: &'a IdentityTokenProvider<S, C>,
    ) -> Self {
        Self {
            config,
            entrypoint,
            assets_dir,
            provider,
            filter: None,
        }
    }

    /// Only runs cases whose id contains `filter`.
    #[must_use]
    pub fn filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    fn command_runner(&self) -> Box<dyn CommandRunner> {
        if self.config.container {
            Box::new(ContainerRunner::new().with_program(&self.config.container_program))
        } else {
            Box::new(LocalRunner)
        }
    }

    /// Runs the suite.
    ///
    /// # Errors
    ///
    /// Returns an error if an identity token cannot be obtained or a
    /// workspace cannot be set up. Scenario failures are recorded in the
    /// report instead.
    pub fn run(&self) -> Result<SuiteReport> {
        let started = Instant::now();
        let mut report = SuiteReport::new(Utc::now(), ReportEnvironment::from_env());

        let cases: Vec<Case> = all_cases()
            .into_iter()
            .filter(|case| matches_filter(case, self.filter.as_deref()))
            .collect();
        info!(
            cases = cases.len(),
            environment = %self.config.environment,
            "running conformance suite"
        );

        for case in &cases {
            let id = case.id();
            if let Some(reason) = skip_reason(self.config, case) {
                debug!(case = %id, reason = reason.message(), "skipped");
                report.record(
                    id,
                    CaseOutcome::Skipped,
                    Duration::ZERO,
                    Some(reason.message().to_string()),
                );
                continue;
            }

            let case_started = Instant::now();
            let result = self.run_case(case)?;
            let elapsed = case_started.elapsed();

            let (outcome, message) = classify(&result, self.config.is_xfail(case.scenario.name));
            match outcome {
                CaseOutcome::Failed => warn!(case = %id, "failed"),
                CaseOutcome::Xfailed => info!(case = %id, "failed as expected"),
                CaseOutcome::Passed | CaseOutcome::Skipped => info!(case = %id, "passed"),
            }
            report.record(id, outcome, elapsed, message);
        }

        report.finish(started.elapsed());
        info!(summary = %report.summary_line(), "conformance suite finished");
        Ok(report)
    }

    /// Runs one case. The outer error is fatal to the run, the inner one is
    /// the case's own failure.
    fn run_case(&self, case: &Case) -> Result<Result<()>> {
        let token = if case.scenario.signing {
            self.provider
                .token()
                .context("failed to obtain an identity token for signing")?
        } else {
            None
        };

        let _workspace = Workspace::enter(Some(self.assets_dir.as_path()))
            .with_context(|| format!("failed to set up workspace for {}", case.id()))?;
        let client = SigstoreClient::with_runner(
            self.entrypoint.clone(),
            token,
            self.config.staging(),
            self.command_runner(),
        );
        let mut ctx = ScenarioContext::new(client, case.input, case.kind);
        Ok(case.run(&mut ctx))
    }
}
