//! Error types for the client protocol adapter.

use thiserror::Error;

use super::invocation::Invocation;
use crate::materials::MaterialsKind;

/// Errors raised while driving the client under test.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The client exited non-zero.
    #[error("client command failed{0}")]
    CommandFailed(Box<Invocation>),

    /// A [`raises`](super::SigstoreClient::raises) scope completed without
    /// the client failing.
    #[error("client unexpectedly succeeded{0}")]
    UnexpectedSuccess(Box<Invocation>),

    /// A [`raises`](super::SigstoreClient::raises) scope completed without
    /// invoking the client at all.
    #[error("expected the client to fail, but it was never invoked")]
    NotInvoked,

    /// The client process could not be started.
    #[error("failed to spawn client `{command}`: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A signing operation was requested without an identity token.
    #[error("signing requires an identity token, but signing is disabled for this run")]
    MissingIdentityToken,

    /// A digest subject was passed with materials that only verify files.
    #[error("digest subjects can only be verified with bundle materials, got {kind}")]
    DigestUnsupported {
        /// The materials kind in use.
        kind: MaterialsKind,
    },

    /// Filesystem error while preparing an invocation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether this error is a client rejection, the failure mode
    /// [`raises`](super::SigstoreClient::raises) expects.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::CommandFailed(_))
    }

    /// The captured invocation, for errors that carry one.
    #[must_use]
    pub fn invocation(&self) -> Option<&Invocation> {
        match self {
            Self::CommandFailed(invocation) | Self::UnexpectedSuccess(invocation) => {
                Some(invocation)
            },
            _ => None,
        }
    }
}
