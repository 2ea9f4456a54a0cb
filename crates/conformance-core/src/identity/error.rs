//! Identity token acquisition errors.

use thiserror::Error;

/// Errors raised while acquiring or validating an identity token.
///
/// All variants are fatal to a harness run: a caller must never substitute an
/// invalid token for a failed acquisition.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The token is not a decodable JWT with an `exp` claim.
    #[error("malformed identity token: {reason}")]
    Malformed {
        /// What could not be decoded.
        reason: String,
    },

    /// The expected token artifact was not found at the source.
    #[error("token artifact {name} not found in {location}")]
    MissingArtifact {
        /// Artifact or file name that was expected.
        name: String,
        /// Where it was looked up.
        location: String,
    },

    /// The source exposed an unexpected number of token artifacts.
    #[error("expected exactly {expected} token artifact(s), found {found}")]
    ArtifactCount {
        /// Number of artifacts expected.
        expected: usize,
        /// Number of artifacts found.
        found: usize,
    },

    /// An HTTP request to the token source failed.
    #[error("identity token source HTTP error (status {status:?}): {message}")]
    Http {
        /// Response status, when one was received.
        status: Option<u16>,
        /// Error or response body.
        message: String,
    },

    /// The token source failed for a reason other than HTTP transport.
    #[error("identity token source {source_name} failed: {message}")]
    Source {
        /// Name of the failing source.
        source_name: &'static str,
        /// Failure description.
        message: String,
    },

    /// I/O failure while reading a fetched token.
    #[error("I/O error while acquiring identity token: {0}")]
    Io(#[from] std::io::Error),

    /// No usable token appeared within the retry window.
    #[error("failed to find a valid identity token within {waited_secs}s after {attempts} attempt(s)")]
    Timeout {
        /// Seconds spent polling.
        waited_secs: u64,
        /// Number of fetch attempts made.
        attempts: u32,
    },

    /// Acquisition was cancelled by the caller.
    #[error("identity token acquisition cancelled")]
    Cancelled,

    /// The token cache lock was poisoned by a panicking holder.
    #[error("identity token cache lock poisoned")]
    LockPoisoned,
}

impl TokenError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn http(error: &reqwest::Error) -> Self {
        Self::Http {
            status: error.status().map(|status| status.as_u16()),
            message: error.to_string(),
        }
    }
}
