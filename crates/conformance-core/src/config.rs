//! Harness run configuration.
//!
//! Settings come from an optional TOML file, then the process environment,
//! then command-line flags, each layer overriding the previous one. The
//! environment layer reads the same variables the GitHub Action sets.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::{DEFAULT_MIN_VALIDITY, IDENTITY_TOKEN_ENV, RetryPolicy};

/// Environment variable naming the client entrypoint.
pub const ENTRYPOINT_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_ENTRYPOINT";
/// Environment variable selecting container execution.
pub const CONTAINER_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_CONTAINER";
/// Environment variable naming the container CLI, e.g. `podman`.
pub const CONTAINER_PROGRAM_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_CONTAINER_PROGRAM";
/// Environment variable selecting `production` or `staging`.
pub const ENVIRONMENT_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_ENVIRONMENT";
/// Environment variable disabling signing scenarios.
pub const SKIP_SIGNING_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_SKIP_SIGNING";
/// Environment variable with the minimum token validity in seconds.
pub const MIN_ID_TOKEN_VALIDITY_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_MIN_ID_TOKEN_VALIDITY";
/// Environment variable selecting the identity token source.
pub const TOKEN_SOURCE_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_TOKEN_SOURCE";
/// Environment variable with space-separated expected-failure scenario names.
pub const XFAIL_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_XFAIL";
/// Environment variable pointing at the scenario asset directory.
pub const ASSETS_ENV: &str = "GHA_SIGSTORE_CONFORMANCE_ASSETS";
/// Set by CI providers.
pub const CI_ENV: &str = "CI";

/// Trust infrastructure the client is run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Public-good production instance.
    #[default]
    Production,
    /// Staging instance.
    Staging,
}

impl Environment {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            other => Err(ConfigError::Validation(format!(
                "unknown environment '{other}', expected 'production' or 'staging'"
            ))),
        }
    }
}

/// Where identity tokens come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenSourceKind {
    /// The beacon repository's `current-token` branch.
    #[default]
    Git,
    /// The beacon workflow's uploaded artifact, via the GitHub API.
    WorkflowArtifact,
    /// The GitHub Actions OIDC endpoint of the current job.
    Actions,
    /// A fixed token from `SIGSTORE_IDENTITY_TOKEN`.
    Env,
}

impl TokenSourceKind {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::WorkflowArtifact => "workflow-artifact",
            Self::Actions => "actions",
            Self::Env => "env",
        }
    }
}

impl fmt::Display for TokenSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenSourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(Self::Git),
            "workflow-artifact" => Ok(Self::WorkflowArtifact),
            "actions" => Ok(Self::Actions),
            "env" => Ok(Self::Env),
            other => Err(ConfigError::Validation(format!(
                "unknown token source '{other}', expected one of: git, workflow-artifact, \
                 actions, env"
            ))),
        }
    }
}

/// Complete configuration of one harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Command that invokes the client under test, or its container tag.
    pub entrypoint: Option<String>,

    /// Treat the entrypoint as a container image tag.
    pub container: bool,

    /// Container CLI used when `container` is set.
    pub container_program: PathBuf,

    /// `production` or `staging`. Kept as a string so that unknown values
    /// surface as validation errors rather than parse errors.
    pub environment: String,

    /// Skip every scenario that needs signing.
    pub skip_signing: bool,

    /// Minimum remaining validity of identity tokens.
    #[serde(rename = "min_token_validity_secs", with = "duration_secs")]
    pub min_token_validity: Duration,

    /// Identity token source.
    pub token_source: TokenSourceKind,

    /// Scenario names expected to fail.
    pub xfail: BTreeSet<String>,

    /// Whether the run happens in CI. Widens the token retry window.
    pub ci: bool,

    /// Directory whose contents are copied into every scenario workspace.
    pub assets_dir: PathBuf,

    /// Where the JSON report is written.
    pub report_path: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            entrypoint: None,
            container: false,
            container_program: PathBuf::from("docker"),
            environment: Environment::Production.as_str().to_string(),
            skip_signing: false,
            min_token_validity: DEFAULT_MIN_VALIDITY,
            token_source: TokenSourceKind::default(),
            xfail: BTreeSet::new(),
            ci: false,
            assets_dir: default_assets_dir(),
            report_path: default_report_path(),
        }
    }
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("test/assets")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("conformance-report.json")
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Overlays the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_env_from`].
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlays variables read through `lookup`. Unset variables leave the
    /// current value untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for unparseable booleans, numbers,
    /// or token source names.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(entrypoint) = lookup(ENTRYPOINT_ENV).filter(|value| !value.is_empty()) {
            self.entrypoint = Some(entrypoint);
        }
        if let Some(value) = lookup(CONTAINER_ENV) {
            self.container = parse_bool(CONTAINER_ENV, &value)?;
        }
        if let Some(value) = lookup(CONTAINER_PROGRAM_ENV).filter(|value| !value.is_empty()) {
            self.container_program = PathBuf::from(value);
        }
        if let Some(environment) = lookup(ENVIRONMENT_ENV).filter(|value| !value.is_empty()) {
            self.environment = environment;
        }
        if let Some(value) = lookup(SKIP_SIGNING_ENV) {
            self.skip_signing = parse_bool(SKIP_SIGNING_ENV, &value)?;
        }
        if let Some(value) = lookup(MIN_ID_TOKEN_VALIDITY_ENV).filter(|value| !value.is_empty()) {
            let secs = value.trim().parse::<u64>().map_err(|e| {
                ConfigError::Validation(format!(
                    "{MIN_ID_TOKEN_VALIDITY_ENV} must be a whole number of seconds: {e}"
                ))
            })?;
            self.min_token_validity = Duration::from_secs(secs);
        }
        if let Some(value) = lookup(TOKEN_SOURCE_ENV).filter(|value| !value.is_empty()) {
            self.token_source = value.trim().parse()?;
        }
        if let Some(value) = lookup(XFAIL_ENV).filter(|value| !value.trim().is_empty()) {
            self.xfail = value.split_whitespace().map(str::to_string).collect();
        }
        if let Some(value) = lookup(ASSETS_ENV).filter(|value| !value.is_empty()) {
            self.assets_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(CI_ENV) {
            self.ci = !value.is_empty();
        }
        Ok(())
    }

    /// The parsed environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unknown environment name.
    pub fn environment(&self) -> Result<Environment, ConfigError> {
        self.environment.parse()
    }

    /// Whether the client targets staging.
    #[must_use]
    pub fn staging(&self) -> bool {
        matches!(self.environment(), Ok(Environment::Staging))
    }

    /// Token polling bounds for this run.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::for_environment(self.ci)
    }

    /// Whether `scenario` is expected to fail.
    #[must_use]
    pub fn is_xfail(&self, scenario: &str) -> bool {
        self.xfail.contains(scenario)
    }

    /// Checks the configuration against the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_with`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(|name| std::env::var(name).ok())
    }

    /// Checks the configuration for missing and contradictory settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] without an entrypoint, and
    /// [`ConfigError::Validation`] for an unknown environment or an `env`
    /// token source with no token while signing is enabled.
    pub fn validate_with<F>(&self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self
            .entrypoint
            .as_deref()
            .is_none_or(|entrypoint| entrypoint.trim().is_empty())
        {
            return Err(ConfigError::Missing {
                field: "entrypoint",
                env: ENTRYPOINT_ENV,
            });
        }
        self.environment()?;

        if self.token_source == TokenSourceKind::Env
            && !self.skip_signing
            && lookup(IDENTITY_TOKEN_ENV).is_none_or(|token| token.trim().is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "token source 'env' requires {IDENTITY_TOKEN_ENV} unless signing is skipped"
            )));
        }
        Ok(())
    }

    /// The entrypoint to execute.
    ///
    /// Container tags are used as given. Relative local entrypoints are
    /// resolved against `invocation_dir`, since scenarios run from their own
    /// working directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] without an entrypoint.
    pub fn resolve_entrypoint(&self, invocation_dir: &Path) -> Result<OsString, ConfigError> {
        let entrypoint = self.entrypoint.as_deref().ok_or(ConfigError::Missing {
            field: "entrypoint",
            env: ENTRYPOINT_ENV,
        })?;
        if self.container {
            return Ok(OsString::from(entrypoint));
        }
        let path = Path::new(entrypoint);
        if path.is_absolute() {
            Ok(path.as_os_str().to_owned())
        } else {
            Ok(invocation_dir.join(path).into_os_string())
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::Validation(format!(
            "{name} must be 'true' or 'false', got '{other}'"
        ))),
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),

    /// A required setting was not provided.
    #[error("missing required setting '{field}' (set it in the config file or via {env})")]
    Missing {
        /// Config file key.
        field: &'static str,
        /// Environment variable that also sets it.
        env: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.environment().unwrap(), Environment::Production);
        assert_eq!(config.min_token_validity, Duration::from_secs(20));
        assert_eq!(config.token_source, TokenSourceKind::Git);
        assert_eq!(config.container_program, PathBuf::from("docker"));
        assert_eq!(config.retry_policy(), RetryPolicy::interactive());
        assert!(!config.staging());
    }

    #[test]
    fn test_parse_toml() {
        let config = HarnessConfig::from_toml(
            r#"
            entrypoint = "bin/client"
            environment = "staging"
            skip_signing = true
            min_token_validity_secs = 45
            token_source = "workflow-artifact"
            xfail = ["test_verify_rejects_root"]
            "#,
        )
        .unwrap();

        assert_eq!(config.entrypoint.as_deref(), Some("bin/client"));
        assert!(config.staging());
        assert!(config.skip_signing);
        assert_eq!(config.min_token_validity, Duration::from_secs(45));
        assert_eq!(config.token_source, TokenSourceKind::WorkflowArtifact);
        assert!(config.is_xfail("test_verify_rejects_root"));
        assert_eq!(config.assets_dir, PathBuf::from("test/assets"));
    }

    #[test]
    fn test_parse_toml_rejects_bad_types() {
        assert!(matches!(
            HarnessConfig::from_toml("min_token_validity_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            HarnessConfig::from_toml("token_source = \"carrier-pigeon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = HarnessConfig::from_toml(
            r#"
            entrypoint = "from-file"
            xfail = ["a"]
            "#,
        )
        .unwrap();
        config
            .apply_env_from(env(&[
                (ENTRYPOINT_ENV, "from-env"),
                (SKIP_SIGNING_ENV, "TRUE"),
                (MIN_ID_TOKEN_VALIDITY_ENV, "60"),
                (XFAIL_ENV, "test_one  test_two"),
                (TOKEN_SOURCE_ENV, "actions"),
                (CI_ENV, "true"),
            ]))
            .unwrap();

        assert_eq!(config.entrypoint.as_deref(), Some("from-env"));
        assert!(config.skip_signing);
        assert_eq!(config.min_token_validity, Duration::from_secs(60));
        assert_eq!(
            config.xfail.iter().map(String::as_str).collect::<Vec<_>>(),
            ["test_one", "test_two"]
        );
        assert_eq!(config.token_source, TokenSourceKind::Actions);
        assert_eq!(config.retry_policy(), RetryPolicy::ci());
    }

    #[test]
    fn test_empty_env_keeps_file_values() {
        let mut config = HarnessConfig::from_toml(
            r#"
            entrypoint = "from-file"
            container_program = "podman"
            xfail = ["test_verify_rejects_root"]
            assets_dir = "fixtures"
            "#,
        )
        .unwrap();
        config
            .apply_env_from(env(&[
                (ENTRYPOINT_ENV, ""),
                (CONTAINER_PROGRAM_ENV, ""),
                (XFAIL_ENV, ""),
                (ASSETS_ENV, ""),
            ]))
            .unwrap();
        assert_eq!(config.entrypoint.as_deref(), Some("from-file"));
        assert_eq!(config.container_program, PathBuf::from("podman"));
        assert!(config.is_xfail("test_verify_rejects_root"));
        assert_eq!(config.assets_dir, PathBuf::from("fixtures"));

        config.apply_env_from(env(&[(XFAIL_ENV, " \t ")])).unwrap();
        assert!(config.is_xfail("test_verify_rejects_root"));

        config
            .apply_env_from(env(&[(CONTAINER_PROGRAM_ENV, "/usr/bin/nerdctl")]))
            .unwrap();
        assert_eq!(config.container_program, PathBuf::from("/usr/bin/nerdctl"));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = HarnessConfig::default();
        assert!(matches!(
            config.apply_env_from(env(&[(SKIP_SIGNING_ENV, "maybe")])),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.apply_env_from(env(&[(MIN_ID_TOKEN_VALIDITY_ENV, "-5")])),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.apply_env_from(env(&[(TOKEN_SOURCE_ENV, "pigeon")])),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_requires_entrypoint() {
        let config = HarnessConfig::default();
        assert!(matches!(
            config.validate_with(env(&[])),
            Err(ConfigError::Missing {
                field: "entrypoint",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_environment() {
        let config = HarnessConfig {
            entrypoint: Some("client".to_string()),
            environment: "prod".to_string(),
            ..HarnessConfig::default()
        };
        let err = config.validate_with(env(&[])).unwrap_err();
        assert!(err.to_string().contains("unknown environment 'prod'"));
    }

    #[test]
    fn test_validate_env_token_contradiction() {
        let config = HarnessConfig {
            entrypoint: Some("client".to_string()),
            token_source: TokenSourceKind::Env,
            ..HarnessConfig::default()
        };
        assert!(matches!(
            config.validate_with(env(&[])),
            Err(ConfigError::Validation(_))
        ));
        config
            .validate_with(env(&[(IDENTITY_TOKEN_ENV, "a.b.c")]))
            .unwrap();

        let skipping = HarnessConfig {
            skip_signing: true,
            ..config
        };
        skipping.validate_with(env(&[])).unwrap();
    }

    #[test]
    fn test_resolve_entrypoint() {
        let mut config = HarnessConfig {
            entrypoint: Some("bin/client".to_string()),
            ..HarnessConfig::default()
        };
        assert_eq!(
            config.resolve_entrypoint(Path::new("/home/ci")).unwrap(),
            OsString::from("/home/ci/bin/client")
        );

        config.entrypoint = Some("/usr/bin/client".to_string());
        assert_eq!(
            config.resolve_entrypoint(Path::new("/home/ci")).unwrap(),
            OsString::from("/usr/bin/client")
        );

        config.entrypoint = Some("ghcr.io/example/client:v1".to_string());
        config.container = true;
        assert_eq!(
            config.resolve_entrypoint(Path::new("/home/ci")).unwrap(),
            OsString::from("ghcr.io/example/client:v1")
        );
    }
}
