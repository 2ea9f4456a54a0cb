//! Scenario parameter matrix.
//!
//! Scenarios are expanded over how the artifact is presented to the client
//! and which kind of materials carries the signature. Cross-implementation
//! scenarios additionally pair up client releases.

use std::fmt;
use std::io;
use std::path::Path;

use crate::subject::Subject;

/// How a verification names its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactInput {
    /// Pass the artifact path.
    Path,
    /// Pass the artifact's `sha256:` digest.
    Digest,
}

impl ArtifactInput {
    /// Both inputs, in expansion order.
    pub const ALL: [Self; 2] = [Self::Path, Self::Digest];

    /// Parameter label used in scenario ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "PATH",
            Self::Digest => "DIGEST",
        }
    }

    /// Builds the verification subject for `artifact`.
    ///
    /// # Errors
    ///
    /// Returns an error if a digest is requested and the file cannot be read.
    pub fn subject(self, artifact: &Path) -> io::Result<Subject> {
        match self {
            Self::Path => Ok(Subject::from(artifact)),
            Self::Digest => Subject::digest_of(artifact),
        }
    }
}

impl fmt::Display for ArtifactInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client implementation known to the cross-implementation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClientChoice {
    /// sigstore-python.
    SigstorePython,
    /// cosign.
    Cosign,
}

impl ClientChoice {
    /// Every known client.
    pub const ALL: [Self; 2] = [Self::SigstorePython, Self::Cosign];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SigstorePython => "sigstore-python",
            Self::Cosign => "cosign",
        }
    }
}

impl fmt::Display for ClientChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client's release channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReleaseChannel {
    /// Latest tagged release.
    Stable,
    /// Latest build of the default branch.
    Nightly,
}

impl ReleaseChannel {
    /// Every channel.
    pub const ALL: [Self; 2] = [Self::Stable, Self::Nightly];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Nightly => "nightly",
        }
    }
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One client release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Implementation {
    /// Which client.
    pub client: ClientChoice,
    /// Which release channel.
    pub channel: ReleaseChannel,
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.client, self.channel)
    }
}

/// Every client on every channel, clients outermost.
#[must_use]
pub fn each_impl() -> Vec<Implementation> {
    ClientChoice::ALL
        .into_iter()
        .flat_map(|client| {
            ReleaseChannel::ALL
                .into_iter()
                .map(move |channel| Implementation { client, channel })
        })
        .collect()
}

/// Every unordered pair of distinct implementations, in combination order.
#[must_use]
pub fn impl_pairs() -> Vec<(Implementation, Implementation)> {
    let impls = each_impl();
    impls
        .iter()
        .enumerate()
        .flat_map(|(i, first)| impls[i + 1..].iter().map(move |second| (*first, *second)))
        .collect()
}
