//! Identity token lifecycle: acquisition, expiry validation, caching, retry.
//!
//! Signing clients need a short-lived OIDC identity token. The harness
//! obtains one from a [`TokenSource`], checks that it outlives the minimum
//! validity window, and caches it for the rest of the run.
//!
//! # Key Concepts
//!
//! - **`IdentityToken`**: bearer string plus the expiry decoded from its
//!   `exp` claim
//! - **`TokenSource`**: one fetch attempt against the beacon repository, its
//!   workflow artifacts, or the Actions OIDC endpoint
//! - **`IdentityTokenProvider`**: polling, validation and caching on top of a
//!   source, on an injectable [`Clock`]
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use chrono::{TimeDelta, Utc};
//! use conformance_core::identity::{
//!     IdentityTokenProvider, MockTokenSource, TokenFetch, unsigned_token,
//! };
//!
//! let raw = unsigned_token(Utc::now() + TimeDelta::minutes(10));
//! let provider = IdentityTokenProvider::new(MockTokenSource::new([Ok(TokenFetch::ready(raw))]))
//!     .min_validity(Duration::from_secs(20));
//!
//! let token = provider.token().unwrap().unwrap();
//! assert!(token.is_usable(Utc::now(), Duration::from_secs(20)));
//! ```

mod clock;
mod error;
mod provider;
mod source;
mod token;

pub use clock::{CancellationFlag, Clock, ManualClock, SystemClock};
pub use error::TokenError;
pub use provider::{DEFAULT_MIN_VALIDITY, IdentityTokenProvider, RetryPolicy};
pub use source::{
    ACTIONS_ID_TOKEN_REQUEST_TOKEN_ENV, ACTIONS_ID_TOKEN_REQUEST_URL_ENV, ActionsIdTokenSource,
    BEACON_GIT_URL, BEACON_REPOSITORY, BEACON_TOKEN_BRANCH, BEACON_WORKFLOW_ID,
    GitBranchSource, IDENTITY_TOKEN_ENV, MAX_TOKEN_AGE, MockTokenSource, SIGSTORE_AUDIENCE,
    StaticTokenSource, TOKEN_ARTIFACT_NAME, TOKEN_FILE_NAME, TokenFetch, TokenSource,
    WorkflowArtifactSource, read_token_from_archive, unsigned_token,
};
pub use token::{IdentityToken, decode_expiry, is_valid_at, pad_base64};

#[cfg(test)]
mod tests;
