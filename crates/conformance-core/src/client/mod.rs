//! Client protocol adapter.
//!
//! [`SigstoreClient`] maps abstract sign and verify operations onto the CLI
//! protocol every client under test exposes, runs them through a
//! [`CommandRunner`], and classifies the result by exit code.
//!
//! | Operation        | Verb            | Flags                                                                 |
//! |------------------|-----------------|-----------------------------------------------------------------------|
//! | sign (bundle)    | `sign-bundle`   | `--identity-token --bundle [--trusted-root] [--signing-config]`       |
//! | sign (detached)  | `sign`          | `--identity-token --signature --certificate`                          |
//! | verify (bundle)  | `verify-bundle` | `--bundle --certificate-identity --certificate-oidc-issuer [--trusted-root]` |
//! | verify (detached)| `verify`        | `--signature --certificate --certificate-identity --certificate-oidc-issuer [--trusted-root]` |
//!
//! `--staging` directly follows the verb when the client targets staging.
//! The trailing positional argument is the artifact path, or a `sha256:`
//! digest for bundle verification.
//!
//! Any non-zero exit is a rejection; the protocol does not distinguish a
//! rejected input from a crashed client.

mod error;
mod invocation;
mod runner;

use std::ffi::{OsStr, OsString};
use std::path::Path;

pub use error::ClientError;
pub use invocation::{Invocation, Outcome, REDACTED, render_command};
pub use runner::{
    CONTAINER_PASSTHROUGH_ENV, CONTAINER_VOLUME, CommandRunner, CommandSpec, ContainerRunner,
    LocalRunner, RawOutput,
};
use tracing::debug;

use crate::identity::IdentityToken;
use crate::materials::{BundleMaterials, SignatureCertificateMaterials, VerificationMaterials};
use crate::subject::Subject;

/// Identity every verification expects in the signing certificate.
pub const CERTIFICATE_IDENTITY: &str = "https://github.com/sigstore-conformance/extremely-dangerous-public-oidc-beacon/.github/workflows/extremely-dangerous-oidc-beacon.yml@refs/heads/main";

/// OIDC issuer every verification expects in the signing certificate.
pub const CERTIFICATE_OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Argument list under construction.
#[derive(Default)]
struct Args(Vec<OsString>);

impl Args {
    fn verb(verb: &str, staging: bool) -> Self {
        let mut args = Self::default();
        args.push(verb);
        if staging {
            args.push("--staging");
        }
        args
    }

    fn push(&mut self, arg: impl AsRef<OsStr>) {
        self.0.push(arg.as_ref().to_owned());
    }

    fn flag(&mut self, name: &str, value: impl AsRef<OsStr>) {
        self.push(name);
        self.push(value);
    }

    fn optional(&mut self, name: &str, value: Option<&Path>) {
        if let Some(value) = value {
            self.flag(name, value);
        }
    }

    fn expected_identity(&mut self) {
        self.flag("--certificate-identity", CERTIFICATE_IDENTITY);
        self.flag("--certificate-oidc-issuer", CERTIFICATE_OIDC_ISSUER);
    }
}

/// Adapter around the client under test.
///
/// The adapter is owned by one scenario at a time. Its only mutable state
/// is the most recent [`Outcome`], kept for [`Self::raises`] diagnostics.
pub struct SigstoreClient<R = LocalRunner> {
    entrypoint: OsString,
    staging: bool,
    identity_token: Option<IdentityToken>,
    runner: R,
    last: Option<Outcome>,
}

impl SigstoreClient {
    /// Creates an adapter that runs `entrypoint` as a local executable.
    #[must_use]
    pub fn new(
        entrypoint: impl Into<OsString>,
        identity_token: Option<IdentityToken>,
        staging: bool,
    ) -> Self {
        Self::with_runner(entrypoint, identity_token, staging, LocalRunner)
    }
}

impl<R: CommandRunner> SigstoreClient<R> {
    /// Creates an adapter on an explicit runner.
    #[must_use]
    pub fn with_runner(
        entrypoint: impl Into<OsString>,
        identity_token: Option<IdentityToken>,
        staging: bool,
        runner: R,
    ) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            staging,
            identity_token,
            runner,
            last: None,
        }
    }

    /// The client command or container tag.
    #[must_use]
    pub fn entrypoint(&self) -> &OsStr {
        &self.entrypoint
    }

    /// Whether invocations target staging infrastructure.
    #[must_use]
    pub const fn staging(&self) -> bool {
        self.staging
    }

    /// The outcome of the most recent invocation.
    #[must_use]
    pub const fn last_outcome(&self) -> Option<&Outcome> {
        self.last.as_ref()
    }

    /// Runs the client with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::CommandFailed`] if the client exits non-zero,
    /// and [`ClientError::Spawn`] if it cannot be started.
    pub fn run<I, A>(&mut self, args: I) -> Result<Invocation, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_owned())
            .collect();
        self.last = None;

        let spec = self.runner.command(&self.entrypoint, &args)?;
        let command = render_command(
            spec.argv(),
            self.identity_token.as_ref().map(IdentityToken::expose),
        );
        debug!(%command, "invoking client");

        let raw = self
            .runner
            .run(&spec)
            .map_err(|source| ClientError::Spawn {
                command: command.clone(),
                source,
            })?;
        let outcome = Outcome::classify(Invocation {
            command,
            exit_code: raw.status,
            stdout: raw.stdout,
            stderr: raw.stderr,
        });
        self.last = Some(outcome.clone());

        match outcome {
            Outcome::Completed(invocation) => Ok(invocation),
            Outcome::Failed(invocation) => {
                debug!(exit_code = ?invocation.exit_code, "client rejected invocation");
                Err(ClientError::CommandFailed(Box::new(invocation)))
            },
        }
    }

    /// Signs `artifact`, writing the outputs `materials` names.
    ///
    /// On failure no output is guaranteed to exist, and anything partially
    /// written must not be trusted.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingIdentityToken`] if the adapter has no
    /// token, otherwise see [`Self::run`].
    pub fn sign(
        &mut self,
        materials: &VerificationMaterials,
        artifact: &Path,
    ) -> Result<Invocation, ClientError> {
        let token = self
            .identity_token
            .as_ref()
            .ok_or(ClientError::MissingIdentityToken)?;

        let mut args = match materials {
            VerificationMaterials::Bundle(BundleMaterials {
                bundle,
                trusted_root,
                signing_config,
            }) => {
                let mut args = Args::verb("sign-bundle", self.staging);
                args.flag("--identity-token", token.expose());
                args.flag("--bundle", bundle);
                args.optional("--trusted-root", trusted_root.as_deref());
                args.optional("--signing-config", signing_config.as_deref());
                args
            },
            VerificationMaterials::SignatureCertificate(SignatureCertificateMaterials {
                signature,
                certificate,
                trusted_root: _,
            }) => {
                let mut args = Args::verb("sign", self.staging);
                args.flag("--identity-token", token.expose());
                args.flag("--signature", signature);
                args.flag("--certificate", certificate);
                args
            },
        };

        args.push(artifact);
        self.run(args.0)
    }

    /// Verifies `subject` against `materials`, expecting the conformance
    /// beacon's identity and issuer.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DigestUnsupported`] for a digest subject with
    /// detached materials, otherwise see [`Self::run`].
    pub fn verify(
        &mut self,
        materials: &VerificationMaterials,
        subject: &Subject,
    ) -> Result<Invocation, ClientError> {
        let mut args = match materials {
            VerificationMaterials::Bundle(BundleMaterials {
                bundle,
                trusted_root,
                signing_config: _,
            }) => {
                let mut args = Args::verb("verify-bundle", self.staging);
                args.flag("--bundle", bundle);
                args.expected_identity();
                args.optional("--trusted-root", trusted_root.as_deref());
                args
            },
            VerificationMaterials::SignatureCertificate(SignatureCertificateMaterials {
                signature,
                certificate,
                trusted_root,
            }) => {
                if subject.is_digest() {
                    return Err(ClientError::DigestUnsupported {
                        kind: materials.kind(),
                    });
                }
                let mut args = Args::verb("verify", self.staging);
                args.flag("--signature", signature);
                args.flag("--certificate", certificate);
                args.expected_identity();
                args.optional("--trusted-root", trusted_root.as_deref());
                args
            },
        };

        args.push(subject.as_arg());
        self.run(args.0)
    }

    /// Runs `op`, expecting the client to reject one of its invocations.
    ///
    /// A [`ClientError::CommandFailed`] raised inside the scope is absorbed.
    /// Any other error propagates unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedSuccess`] carrying the last
    /// invocation if `op` completes, or [`ClientError::NotInvoked`] if it
    /// completes without running the client.
    pub fn raises<T, F>(&mut self, op: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut Self) -> Result<T, ClientError>,
    {
        self.last = None;
        match op(self) {
            Err(ClientError::CommandFailed(invocation)) => {
                debug!(command = %invocation.command, "client rejected as expected");
                Ok(())
            },
            Err(other) => Err(other),
            Ok(_) => match &self.last {
                Some(outcome) => Err(ClientError::UnexpectedSuccess(Box::new(
                    outcome.invocation().clone(),
                ))),
                None => Err(ClientError::NotInvoked),
            },
        }
    }
}
