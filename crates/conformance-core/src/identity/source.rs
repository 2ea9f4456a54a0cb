//! Identity token sources.
//!
//! A [`TokenSource`] performs one fetch attempt. Polling, validity checks and
//! caching live in [`IdentityTokenProvider`](super::IdentityTokenProvider).
//!
//! ```text
//! TokenSource (trait)
//!     |
//!     +-- GitBranchSource         clones the beacon's `current-token` branch
//!     +-- WorkflowArtifactSource  downloads the beacon workflow's artifact
//!     +-- ActionsIdTokenSource    exchanges with the GitHub Actions OIDC endpoint
//!     +-- StaticTokenSource       a fixed token
//!     +-- MockTokenSource         scripted responses for tests
//! ```

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::error::TokenError;

/// Repository publishing a fresh public-good identity token every few minutes.
pub const BEACON_REPOSITORY: &str = "sigstore-conformance/extremely-dangerous-public-oidc-beacon";

/// Git URL of the beacon repository.
pub const BEACON_GIT_URL: &str =
    "https://github.com/sigstore-conformance/extremely-dangerous-public-oidc-beacon.git";

/// Branch of the beacon repository holding the current token.
pub const BEACON_TOKEN_BRANCH: &str = "current-token";

/// Workflow id of the beacon's token-minting workflow.
pub const BEACON_WORKFLOW_ID: u64 = 55_399_612;

/// Name of the workflow artifact carrying the token.
pub const TOKEN_ARTIFACT_NAME: &str = "oidc-token";

/// File holding the token, both on the branch and inside the artifact.
pub const TOKEN_FILE_NAME: &str = "oidc-token.txt";

/// Workflow runs older than this carry a stale token.
pub const MAX_TOKEN_AGE: Duration = Duration::from_secs(5 * 60);

/// Audience requested from the Actions OIDC endpoint.
pub const SIGSTORE_AUDIENCE: &str = "sigstore";

/// Environment variable holding a pre-acquired token.
pub const IDENTITY_TOKEN_ENV: &str = "SIGSTORE_IDENTITY_TOKEN";

/// Environment variable holding the Actions OIDC request URL.
pub const ACTIONS_ID_TOKEN_REQUEST_URL_ENV: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";

/// Environment variable holding the Actions OIDC request bearer token.
pub const ACTIONS_ID_TOKEN_REQUEST_TOKEN_ENV: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

const DEFAULT_GITHUB_API_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "sigstore-conformance/identity-token-source";

/// Result of one fetch attempt.
pub enum TokenFetch {
    /// A token was retrieved. It still has to pass the validity check.
    Ready(SecretString),
    /// The source has nothing fresh yet; try again after the backoff.
    Stale {
        /// Why the attempt was not usable.
        reason: String,
    },
}

impl TokenFetch {
    /// Wraps a raw token.
    #[must_use]
    pub fn ready(raw: impl Into<String>) -> Self {
        Self::Ready(SecretString::from(raw.into()))
    }

    /// A retryable miss.
    #[must_use]
    pub fn stale(reason: impl Into<String>) -> Self {
        Self::Stale {
            reason: reason.into(),
        }
    }
}

/// Something that can hand out identity tokens.
pub trait TokenSource: Send + Sync {
    /// Performs a single fetch attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] for failures that retrying will not fix:
    /// transport errors, a missing artifact, or a wrong artifact count.
    fn fetch(&self) -> Result<TokenFetch, TokenError>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}

impl<S: TokenSource + ?Sized> TokenSource for Box<S> {
    fn fetch(&self) -> Result<TokenFetch, TokenError> {
        (**self).fetch()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<S: TokenSource + ?Sized> TokenSource for Arc<S> {
    fn fetch(&self) -> Result<TokenFetch, TokenError> {
        (**self).fetch()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

fn build_http_client(source_name: &'static str) -> Result<reqwest::blocking::Client, TokenError> {
    reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(60))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|error| TokenError::Source {
            source_name,
            message: format!("failed to initialise HTTP client: {error}"),
        })
}

fn send(
    request: reqwest::blocking::RequestBuilder,
) -> Result<reqwest::blocking::Response, TokenError> {
    let response = request.send().map_err(|error| TokenError::http(&error))?;
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .unwrap_or_else(|_| "unable to read response body".to_string());
        return Err(TokenError::Http {
            status: Some(status.as_u16()),
            message,
        });
    }
    Ok(response)
}

fn token_from_contents(contents: &str) -> SecretString {
    SecretString::from(contents.trim_end().to_owned())
}

/// Builds an unsigned JWT-shaped token expiring at `expiry`.
///
/// Only useful against mocks and fake clients; real signing infrastructure
/// rejects it.
#[must_use]
pub fn unsigned_token(expiry: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "iss": "https://token.actions.githubusercontent.com",
        "sub": "conformance-test",
        "exp": expiry.timestamp(),
    });
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{claims}.")
}

// =============================================================================
// Git branch
// =============================================================================

/// Shallow-clones the beacon's token branch and reads the token file.
#[derive(Debug, Clone)]
pub struct GitBranchSource {
    repo_url: String,
    branch: String,
    file_name: String,
    git_program: PathBuf,
}

impl Default for GitBranchSource {
    fn default() -> Self {
        Self::new(BEACON_GIT_URL)
    }
}

impl GitBranchSource {
    /// Clones `repo_url` at the default token branch.
    #[must_use]
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: BEACON_TOKEN_BRANCH.to_string(),
            file_name: TOKEN_FILE_NAME.to_string(),
            git_program: PathBuf::from("git"),
        }
    }

    /// Overrides the `git` executable.
    #[must_use]
    pub fn with_git_program(mut self, git_program: impl Into<PathBuf>) -> Self {
        self.git_program = git_program.into();
        self
    }
}

impl TokenSource for GitBranchSource {
    fn fetch(&self) -> Result<TokenFetch, TokenError> {
        let checkout = tempfile::tempdir()?;
        debug!(repo = %self.repo_url, branch = %self.branch, "cloning token branch");

        let output = Command::new(&self.git_program)
            .args(["clone", "--quiet", "--branch", &self.branch, "--depth", "1"])
            .arg(&self.repo_url)
            .arg(checkout.path())
            .stdin(Stdio::null())
            .output()
            .map_err(|error| TokenError::Source {
                source_name: self.name(),
                message: format!("failed to run {}: {error}", self.git_program.display()),
            })?;
        if !output.status.success() {
            return Err(TokenError::Source {
                source_name: self.name(),
                message: format!(
                    "git clone of {} exited with {}: {}",
                    self.repo_url,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let token_path = checkout.path().join(&self.file_name);
        match std::fs::read_to_string(&token_path) {
            Ok(contents) => Ok(TokenFetch::Ready(token_from_contents(&contents))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(TokenError::MissingArtifact {
                    name: self.file_name.clone(),
                    location: format!("{}@{}", self.repo_url, self.branch),
                })
            },
            Err(error) => Err(TokenError::Io(error)),
        }
    }

    fn name(&self) -> &'static str {
        "git"
    }
}

// =============================================================================
// Workflow artifact
// =============================================================================

#[derive(Debug, Deserialize)]
struct WorkflowRuns {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    status: String,
    conclusion: Option<String>,
    updated_at: String,
    artifacts_url: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactList {
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    name: String,
    archive_download_url: String,
    #[serde(default)]
    expired: bool,
}

/// Polls the beacon workflow's latest run and downloads its token artifact.
pub struct WorkflowArtifactSource {
    api_base_url: String,
    repository: String,
    workflow_id: u64,
    max_age: Duration,
    github_token: Option<SecretString>,
    clock: Arc<dyn Clock>,
    http_client: reqwest::blocking::Client,
}

impl WorkflowArtifactSource {
    /// Creates a source for the public beacon.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(github_token: Option<SecretString>) -> Result<Self, TokenError> {
        Self::new_with_api_base_url(DEFAULT_GITHUB_API_BASE_URL, github_token)
    }

    /// Creates a source against an explicit API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is empty or the HTTP client cannot be
    /// initialised.
    pub fn new_with_api_base_url(
        api_base_url: impl Into<String>,
        github_token: Option<SecretString>,
    ) -> Result<Self, TokenError> {
        let api_base_url = api_base_url.into();
        if api_base_url.trim().is_empty() {
            return Err(TokenError::Source {
                source_name: "workflow-artifact",
                message: "api_base_url must not be empty".to_string(),
            });
        }
        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            repository: BEACON_REPOSITORY.to_string(),
            workflow_id: BEACON_WORKFLOW_ID,
            max_age: MAX_TOKEN_AGE,
            github_token,
            clock: Arc::new(SystemClock),
            http_client: build_http_client("workflow-artifact")?,
        })
    }

    /// Uses `clock` to judge run staleness.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn get(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        let request = self
            .http_client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.github_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn judge_run(&self, run: &WorkflowRun) -> Result<Option<String>, TokenError> {
        if run.status != "completed" {
            return Ok(Some(format!("run {} is still {}", run.id, run.status)));
        }
        if run.conclusion.as_deref() != Some("success") {
            return Ok(Some(format!(
                "run {} concluded {}",
                run.id,
                run.conclusion.as_deref().unwrap_or("without a conclusion")
            )));
        }

        let updated_at = DateTime::parse_from_rfc3339(&run.updated_at)
            .map_err(|error| TokenError::Source {
                source_name: self.name(),
                message: format!("invalid updated_at {:?}: {error}", run.updated_at),
            })?
            .with_timezone(&Utc);
        let max_age = TimeDelta::from_std(self.max_age).unwrap_or(TimeDelta::MAX);
        let age = self.clock.now().signed_duration_since(updated_at);
        if age > max_age {
            return Ok(Some(format!(
                "run {} is {}s old",
                run.id,
                age.num_seconds()
            )));
        }
        Ok(None)
    }
}

/// Extracts the token file from a workflow artifact archive.
///
/// # Errors
///
/// Returns [`TokenError::MissingArtifact`] if the archive has no token file,
/// and [`TokenError::Source`] if it is not a zip archive.
pub fn read_token_from_archive(archive: &[u8]) -> Result<SecretString, TokenError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).map_err(|error| {
        TokenError::Source {
            source_name: "workflow-artifact",
            message: format!("invalid artifact archive: {error}"),
        }
    })?;
    let mut file = match zip.by_name(TOKEN_FILE_NAME) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(TokenError::MissingArtifact {
                name: TOKEN_FILE_NAME.to_string(),
                location: format!("{TOKEN_ARTIFACT_NAME} artifact archive"),
            });
        },
        Err(error) => {
            return Err(TokenError::Source {
                source_name: "workflow-artifact",
                message: format!("unreadable artifact archive: {error}"),
            });
        },
    };
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(token_from_contents(&contents))
}

impl TokenSource for WorkflowArtifactSource {
    fn fetch(&self) -> Result<TokenFetch, TokenError> {
        let runs_url = format!(
            "{}/repos/{}/actions/workflows/{}/runs",
            self.api_base_url, self.repository, self.workflow_id
        );
        let query = [("status", "completed"), ("per_page", "1")];
        let runs: WorkflowRuns = send(self.get(&runs_url).query(&query))?
            .json()
            .map_err(|error| TokenError::http(&error))?;

        let Some(run) = runs.workflow_runs.into_iter().next() else {
            return Ok(TokenFetch::stale("beacon workflow has no runs"));
        };
        if let Some(reason) = self.judge_run(&run)? {
            return Ok(TokenFetch::stale(reason));
        }

        let listing: ArtifactList = send(self.get(&run.artifacts_url))?
            .json()
            .map_err(|error| TokenError::http(&error))?;
        if listing.artifacts.len() != 1 {
            return Err(TokenError::ArtifactCount {
                expected: 1,
                found: listing.artifacts.len(),
            });
        }
        let artifact = &listing.artifacts[0];
        if artifact.name != TOKEN_ARTIFACT_NAME || artifact.expired {
            return Err(TokenError::MissingArtifact {
                name: TOKEN_ARTIFACT_NAME.to_string(),
                location: format!("run {} (found {:?})", run.id, artifact.name),
            });
        }

        debug!(run_id = run.id, "downloading token artifact");
        let archive = send(self.get(&artifact.archive_download_url))?
            .bytes()
            .map_err(|error| TokenError::http(&error))?;
        read_token_from_archive(&archive).map(TokenFetch::Ready)
    }

    fn name(&self) -> &'static str {
        "workflow-artifact"
    }
}

// =============================================================================
// GitHub Actions OIDC
// =============================================================================

/// Requests a token directly from the GitHub Actions OIDC endpoint.
pub struct ActionsIdTokenSource {
    request_url: String,
    request_token: SecretString,
    audience: String,
    http_client: reqwest::blocking::Client,
}

impl ActionsIdTokenSource {
    /// Creates a source for an explicit endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is empty or the HTTP client cannot be
    /// initialised.
    pub fn new(
        request_url: impl Into<String>,
        request_token: SecretString,
    ) -> Result<Self, TokenError> {
        let request_url = request_url.into();
        if request_url.trim().is_empty() || request_token.expose_secret().trim().is_empty() {
            return Err(TokenError::Source {
                source_name: "actions",
                message: "request URL and request token must not be empty".to_string(),
            });
        }
        Ok(Self {
            request_url,
            request_token,
            audience: SIGSTORE_AUDIENCE.to_string(),
            http_client: build_http_client("actions")?,
        })
    }

    /// Reads the endpoint from the Actions runner environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the job lacks `id-token: write` permission (the
    /// variables are unset).
    pub fn from_env() -> Result<Self, TokenError> {
        let missing = |name: &str| TokenError::Source {
            source_name: "actions",
            message: format!("{name} is not set; does the job have `id-token: write`?"),
        };
        let url = std::env::var(ACTIONS_ID_TOKEN_REQUEST_URL_ENV)
            .map_err(|_| missing(ACTIONS_ID_TOKEN_REQUEST_URL_ENV))?;
        let token = std::env::var(ACTIONS_ID_TOKEN_REQUEST_TOKEN_ENV)
            .map_err(|_| missing(ACTIONS_ID_TOKEN_REQUEST_TOKEN_ENV))?;
        Self::new(url, SecretString::from(token))
    }
}

impl TokenSource for ActionsIdTokenSource {
    fn fetch(&self) -> Result<TokenFetch, TokenError> {
        #[derive(Deserialize)]
        struct IdTokenResponse {
            value: String,
        }

        let response: IdTokenResponse = send(
            self.http_client
                .get(&self.request_url)
                .query(&[("audience", self.audience.as_str())])
                .bearer_auth(self.request_token.expose_secret()),
        )?
        .json()
        .map_err(|error| TokenError::http(&error))?;
        Ok(TokenFetch::ready(response.value))
    }

    fn name(&self) -> &'static str {
        "actions"
    }
}

// =============================================================================
// Static and mock
// =============================================================================

/// Always returns the same token.
#[derive(Clone)]
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    /// Wraps `token`.
    #[must_use]
    pub const fn new(token: SecretString) -> Self {
        Self { token }
    }

    /// Reads the token from [`IDENTITY_TOKEN_ENV`], if set and non-empty.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var(IDENTITY_TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(|token| Self::new(SecretString::from(token)))
    }
}

impl TokenSource for StaticTokenSource {
    fn fetch(&self) -> Result<TokenFetch, TokenError> {
        Ok(TokenFetch::Ready(self.token.clone()))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Token source replaying scripted responses.
///
/// Once the script is exhausted, every fetch fails with
/// [`TokenError::Source`].
#[derive(Default)]
pub struct MockTokenSource {
    script: Mutex<VecDeque<Result<TokenFetch, TokenError>>>,
    fetches: std::sync::atomic::AtomicU32,
}

impl MockTokenSource {
    /// Creates a source replaying `script` in order.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = Result<TokenFetch, TokenError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fetches: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Creates a source that hands out `raw` `times` times.
    #[must_use]
    pub fn repeating(raw: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(TokenFetch::ready(raw))))
    }

    /// Number of fetches performed so far.
    #[must_use]
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl TokenSource for MockTokenSource {
    fn fetch(&self) -> Result<TokenFetch, TokenError> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(TokenError::Source {
                    source_name: "mock",
                    message: "no scripted responses left".to_string(),
                })
            })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::identity::token::decode_expiry;

    fn zip_with(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file(name, options).unwrap();
        writer.write_all(contents).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_unsigned_token_round_trips_expiry() {
        let expiry = DateTime::<Utc>::from_timestamp(1_800_000_000, 0).unwrap();
        assert_eq!(decode_expiry(&unsigned_token(expiry)).unwrap(), expiry);
    }

    #[test]
    fn test_read_token_from_archive() {
        let archive = zip_with(TOKEN_FILE_NAME, b"header.claims.sig\n");
        let token = read_token_from_archive(&archive).unwrap();
        assert_eq!(token.expose_secret(), "header.claims.sig");
    }

    #[test]
    fn test_read_token_from_archive_missing_file() {
        let archive = zip_with("something-else.txt", b"x");
        assert!(matches!(
            read_token_from_archive(&archive),
            Err(TokenError::MissingArtifact { name, .. }) if name == TOKEN_FILE_NAME
        ));
    }

    #[test]
    fn test_read_token_from_archive_not_zip() {
        assert!(matches!(
            read_token_from_archive(b"definitely not a zip"),
            Err(TokenError::Source { .. })
        ));
    }

    #[test]
    fn test_workflow_source_rejects_empty_base_url() {
        assert!(matches!(
            WorkflowArtifactSource::new_with_api_base_url(" ", None),
            Err(TokenError::Source { .. })
        ));
    }

    #[test]
    fn test_workflow_run_judgement() {
        let now = DateTime::<Utc>::from_timestamp(1_800_000_000, 0).unwrap();
        let clock = Arc::new(crate::identity::clock::ManualClock::new(now));
        let source = WorkflowArtifactSource::new_with_api_base_url("http://127.0.0.1:9", None)
            .unwrap()
            .with_clock(clock);
        let run = |status: &str, conclusion: Option<&str>, age_secs: i64| WorkflowRun {
            id: 7,
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
            updated_at: (now - TimeDelta::seconds(age_secs)).to_rfc3339(),
            artifacts_url: String::new(),
        };

        assert!(source.judge_run(&run("completed", Some("success"), 60)).unwrap().is_none());
        assert!(
            source
                .judge_run(&run("in_progress", None, 10))
                .unwrap()
                .unwrap()
                .contains("in_progress")
        );
        assert!(source.judge_run(&run("completed", Some("failure"), 10)).unwrap().is_some());
        assert!(
            source
                .judge_run(&run("completed", Some("success"), 301))
                .unwrap()
                .unwrap()
                .contains("old")
        );
    }

    /// A one-thread HTTP server answering GitHub API requests by path. Every
    /// request line it sees is recorded.
    struct ApiStub {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl ApiStub {
        fn start(respond: impl Fn(&str, &str) -> (u16, Vec<u8>) + Send + 'static) -> Self {
            use std::io::BufRead;

            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);
            let own_url = base_url.clone();
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).unwrap();
                    loop {
                        let mut header = String::new();
                        if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                            break;
                        }
                    }
                    let request_line = request_line.trim_end().to_string();
                    let target = request_line.split(' ').nth(1).unwrap_or_default().to_string();
                    seen.lock().unwrap().push(request_line);

                    let path = target.split('?').next().unwrap_or_default();
                    let (status, body) = respond(&own_url, path);
                    let head = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    stream.write_all(head.as_bytes()).unwrap();
                    stream.write_all(&body).unwrap();
                }
            });
            Self { base_url, requests }
        }

        fn source(&self, now: DateTime<Utc>) -> WorkflowArtifactSource {
            WorkflowArtifactSource::new_with_api_base_url(&self.base_url, None)
                .unwrap()
                .with_clock(Arc::new(crate::identity::clock::ManualClock::new(now)))
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    const RUNS_PATH: &str =
        "/repos/sigstore-conformance/extremely-dangerous-public-oidc-beacon/actions/workflows/55399612/runs";

    /// Serves one run with the given status, then `artifacts` (name, expired)
    /// whose downloads all hold `token`.
    fn beacon(
        now: DateTime<Utc>,
        status: &'static str,
        artifacts: &'static [(&'static str, bool)],
        token: String,
    ) -> ApiStub {
        let updated_at = (now - TimeDelta::seconds(30)).to_rfc3339();
        ApiStub::start(move |base_url, path| match path {
            RUNS_PATH => {
                let body = serde_json::json!({
                    "workflow_runs": [{
                        "id": 7,
                        "status": status,
                        "conclusion": (status == "completed").then_some("success"),
                        "updated_at": updated_at,
                        "artifacts_url": format!("{base_url}/runs/7/artifacts"),
                    }]
                });
                (200, body.to_string().into_bytes())
            },
            "/runs/7/artifacts" => {
                let listing: Vec<_> = artifacts
                    .iter()
                    .enumerate()
                    .map(|(index, (name, expired))| {
                        serde_json::json!({
                            "name": name,
                            "expired": expired,
                            "archive_download_url": format!("{base_url}/artifacts/{index}/zip"),
                        })
                    })
                    .collect();
                let body = serde_json::json!({ "total_count": listing.len(), "artifacts": listing });
                (200, body.to_string().into_bytes())
            },
            path if path.starts_with("/artifacts/") => {
                (200, zip_with(TOKEN_FILE_NAME, token.as_bytes()))
            },
            _ => (404, b"{\"message\":\"Not Found\"}".to_vec()),
        })
    }

    fn fetch_now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_800_000_000, 0).unwrap()
    }

    #[test]
    fn test_workflow_source_downloads_token() {
        let now = fetch_now();
        let raw = unsigned_token(now + TimeDelta::minutes(5));
        let stub = beacon(now, "completed", &[(TOKEN_ARTIFACT_NAME, false)], format!("{raw}\n"));

        let Ok(TokenFetch::Ready(token)) = stub.source(now).fetch() else {
            panic!("fresh run must yield a token");
        };
        assert_eq!(token.expose_secret(), raw);

        let requests = stub.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[0],
            format!("GET {RUNS_PATH}?status=completed&per_page=1 HTTP/1.1")
        );
        assert!(requests[1].starts_with("GET /runs/7/artifacts "));
        assert!(requests[2].starts_with("GET /artifacts/0/zip "));
    }

    #[test]
    fn test_workflow_source_rejects_extra_artifacts() {
        let now = fetch_now();
        let stub = beacon(
            now,
            "completed",
            &[(TOKEN_ARTIFACT_NAME, false), (TOKEN_ARTIFACT_NAME, false)],
            unsigned_token(now),
        );
        assert!(matches!(
            stub.source(now).fetch(),
            Err(TokenError::ArtifactCount { expected: 1, found: 2 })
        ));
        assert_eq!(stub.requests().len(), 2);
    }

    #[test]
    fn test_workflow_source_rejects_expired_artifact() {
        let now = fetch_now();
        let stub = beacon(now, "completed", &[(TOKEN_ARTIFACT_NAME, true)], unsigned_token(now));
        assert!(matches!(
            stub.source(now).fetch(),
            Err(TokenError::MissingArtifact { name, .. }) if name == TOKEN_ARTIFACT_NAME
        ));

        let stub = beacon(now, "completed", &[("some-other-artifact", false)], unsigned_token(now));
        assert!(matches!(
            stub.source(now).fetch(),
            Err(TokenError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn test_workflow_source_in_progress_run_is_stale() {
        let now = fetch_now();
        let stub = beacon(now, "in_progress", &[(TOKEN_ARTIFACT_NAME, false)], unsigned_token(now));
        let Ok(TokenFetch::Stale { reason }) = stub.source(now).fetch() else {
            panic!("in-progress run must be stale");
        };
        assert!(reason.contains("in_progress"), "{reason}");
        // Artifacts of an unfinished run are never listed.
        assert_eq!(stub.requests().len(), 1);
    }

    #[test]
    fn test_workflow_source_surfaces_http_errors() {
        let stub = ApiStub::start(|_, _| (500, b"boom".to_vec()));
        assert!(matches!(
            stub.source(fetch_now()).fetch(),
            Err(TokenError::Http { status: Some(500), message }) if message == "boom"
        ));
    }

    #[test]
    fn test_actions_source_rejects_empty_values() {
        assert!(ActionsIdTokenSource::new("", SecretString::from("t".to_string())).is_err());
        assert!(
            ActionsIdTokenSource::new("https://example.invalid/token", SecretString::from(" ".to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_static_source() {
        let source = StaticTokenSource::new(SecretString::from("abc".to_string()));
        let Ok(TokenFetch::Ready(token)) = source.fetch() else {
            panic!("static source must be ready");
        };
        assert_eq!(token.expose_secret(), "abc");
    }

    #[test]
    fn test_mock_source_exhausts() {
        let source = MockTokenSource::new([Ok(TokenFetch::stale("not yet"))]);
        assert!(matches!(source.fetch(), Ok(TokenFetch::Stale { .. })));
        assert!(matches!(
            source.fetch(),
            Err(TokenError::Source { source_name: "mock", .. })
        ));
        assert_eq!(source.fetch_count(), 2);
    }

    #[cfg(unix)]
    fn fake_git(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-git");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_git_source_reads_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let git = fake_git(
            dir.path(),
            "for last; do :; done\nmkdir -p \"$last\"\nprintf 'a.b.c\\n' > \"$last/oidc-token.txt\"",
        );
        let source = GitBranchSource::default().with_git_program(git);

        let Ok(TokenFetch::Ready(token)) = source.fetch() else {
            panic!("git source must be ready");
        };
        assert_eq!(token.expose_secret(), "a.b.c");
    }

    #[cfg(unix)]
    #[test]
    fn test_git_source_missing_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let git = fake_git(dir.path(), "for last; do :; done\nmkdir -p \"$last\"");
        let source = GitBranchSource::default().with_git_program(git);

        assert!(matches!(
            source.fetch(),
            Err(TokenError::MissingArtifact { name, .. }) if name == TOKEN_FILE_NAME
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_git_source_clone_failure() {
        let dir = tempfile::tempdir().unwrap();
        let git = fake_git(dir.path(), "echo 'fatal: repository not found' >&2\nexit 128");
        let source = GitBranchSource::default().with_git_program(git);

        assert!(matches!(
            source.fetch(),
            Err(TokenError::Source { source_name: "git", message }) if message.contains("repository not found")
        ));
    }
}
