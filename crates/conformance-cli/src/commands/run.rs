//! `run`: execute the suite against a client and write the report.
//!
//! Settings are layered: the TOML file (if given), then the
//! `GHA_SIGSTORE_CONFORMANCE_*` environment, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use conformance_core::config::{Environment, TokenSourceKind};
use conformance_core::identity::{
    ActionsIdTokenSource, GitBranchSource, IdentityTokenProvider, StaticTokenSource, TokenSource,
    WorkflowArtifactSource,
};
use conformance_core::HarnessConfig;
use secrecy::SecretString;
use tracing::{info, warn};

use crate::suite::runner::SuiteRunner;

/// Token for GitHub API requests made by the workflow-artifact source.
const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Arguments for `run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Command that invokes the client under test
    #[arg(long)]
    pub entrypoint: Option<String>,

    /// Treat the entrypoint as a container image tag
    #[arg(long)]
    pub container: bool,

    /// Container CLI to run the image with (default: docker)
    #[arg(long, value_name = "PROGRAM")]
    pub container_program: Option<PathBuf>,

    /// Run against Sigstore staging infrastructure
    #[arg(long)]
    pub staging: bool,

    /// Skip every scenario that needs signing
    #[arg(long)]
    pub skip_signing: bool,

    /// Minimum remaining validity of identity tokens, in seconds
    #[arg(long, value_name = "SECS")]
    pub min_id_token_validity: Option<u64>,

    /// Where identity tokens come from (git, workflow-artifact, actions, env)
    #[arg(long)]
    pub token_source: Option<TokenSourceKind>,

    /// Scenario expected to fail (repeatable)
    #[arg(long, value_name = "NAME")]
    pub xfail: Vec<String>,

    /// Directory copied into every scenario workspace
    #[arg(long, value_name = "DIR")]
    pub assets: Option<PathBuf>,

    /// Where to write the JSON report
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Only run cases whose id contains this string
    #[arg(short = 'k', long)]
    pub filter: Option<String>,
}

impl RunArgs {
    /// Overlays the flags that were given onto `config`.
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(entrypoint) = &self.entrypoint {
            config.entrypoint = Some(entrypoint.clone());
        }
        if self.container {
            config.container = true;
        }
        if let Some(program) = &self.container_program {
            config.container_program.clone_from(program);
        }
        if self.staging {
            config.environment = Environment::Staging.as_str().to_string();
        }
        if self.skip_signing {
            config.skip_signing = true;
        }
        if let Some(secs) = self.min_id_token_validity {
            config.min_token_validity = Duration::from_secs(secs);
        }
        if let Some(kind) = self.token_source {
            config.token_source = kind;
        }
        config.xfail.extend(self.xfail.iter().cloned());
        if let Some(assets) = &self.assets {
            config.assets_dir.clone_from(assets);
        }
        if let Some(report) = &self.report {
            config.report_path.clone_from(report);
        }
    }
}

/// Builds the layered configuration.
fn load_config(config_path: Option<&Path>, args: &RunArgs) -> Result<HarnessConfig> {
    let mut config = match config_path {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    config
        .apply_env()
        .context("invalid GHA_SIGSTORE_CONFORMANCE_* environment")?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn token_source(config: &HarnessConfig) -> Result<Box<dyn TokenSource>> {
    // The provider never fetches with signing skipped.
    if config.skip_signing {
        return Ok(Box::new(GitBranchSource::default()));
    }
    let source: Box<dyn TokenSource> = match config.token_source {
        TokenSourceKind::Git => Box::new(GitBranchSource::default()),
        TokenSourceKind::WorkflowArtifact => {
            let github_token = std::env::var(GITHUB_TOKEN_ENV)
                .ok()
                .filter(|token| !token.is_empty())
                .map(SecretString::from);
            if github_token.is_none() {
                warn!("{GITHUB_TOKEN_ENV} is not set, GitHub API requests are unauthenticated");
            }
            Box::new(WorkflowArtifactSource::new(github_token)?)
        },
        TokenSourceKind::Actions => Box::new(ActionsIdTokenSource::from_env()?),
        TokenSourceKind::Env => Box::new(
            StaticTokenSource::from_env().context("SIGSTORE_IDENTITY_TOKEN is not set")?,
        ),
    };
    Ok(source)
}

/// Runs the suite. Returns the process exit code: 0 if every case passed,
/// was skipped, or failed as expected.
///
/// # Errors
///
/// Returns an error for invalid configuration, token acquisition failures,
/// or an unwritable report.
pub fn run(config_path: Option<&Path>, args: &RunArgs) -> Result<i32> {
    let config = load_config(config_path, args)?;

    // Scenarios run from their own workspaces, so anchor every relative path
    // at the invocation directory first.
    let invocation_dir = std::env::current_dir().context("failed to read current directory")?;
    let entrypoint = config.resolve_entrypoint(&invocation_dir)?;
    let assets_dir = invocation_dir.join(&config.assets_dir);
    let report_path = invocation_dir.join(&config.report_path);

    let provider = IdentityTokenProvider::new(token_source(&config)?)
        .min_validity(config.min_token_validity)
        .retry_policy(config.retry_policy())
        .skip_signing(config.skip_signing);

    info!(
        entrypoint = %entrypoint.to_string_lossy(),
        token_source = %config.token_source,
        "starting conformance run"
    );
    let report = SuiteRunner::new(&config, entrypoint, assets_dir, &provider)
        .filter(args.filter.clone())
        .run()?;

    report.write(&report_path)?;
    if let Err(error) = report.append_step_summary(|name| std::env::var(name).ok()) {
        warn!(%error, "failed to write job summary");
    }

    println!("{}", report.summary_line());
    for case in report.tests.iter().filter(|case| case.outcome.is_failure()) {
        eprintln!("FAILED {}", case.nodeid);
        if let Some(message) = &case.message {
            eprintln!("{message}");
        }
    }

    Ok(report.exitcode)
}
