//! Cached identity token provider.
//!
//! The provider guarantees that every token it hands out stays valid for at
//! least `min_validity` from the moment it is returned. A cached token is
//! reused while it passes that check; otherwise the source is polled with a
//! fixed backoff until a usable token appears or the retry window closes.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use super::clock::{CancellationFlag, Clock, SystemClock};
use super::error::TokenError;
use super::source::{TokenFetch, TokenSource};
use super::token::IdentityToken;

/// Default minimum remaining validity of a handed-out token.
pub const DEFAULT_MIN_VALIDITY: Duration = Duration::from_secs(20);

/// Longest single sleep between cancellation checks.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Bounds on polling a token source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total time allowed for acquisition.
    pub max_retry_time: Duration,
    /// Fixed backoff between attempts.
    pub retry_sleep: Duration,
}

impl RetryPolicy {
    /// Policy for CI runs: 5 minute window, 30 second backoff.
    #[must_use]
    pub const fn ci() -> Self {
        Self {
            max_retry_time: Duration::from_secs(5 * 60),
            retry_sleep: Duration::from_secs(30),
        }
    }

    /// Policy for local runs: 1 minute window, 5 second backoff.
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            max_retry_time: Duration::from_secs(60),
            retry_sleep: Duration::from_secs(5),
        }
    }

    /// Picks [`Self::ci`] or [`Self::interactive`].
    #[must_use]
    pub const fn for_environment(ci: bool) -> Self {
        if ci { Self::ci() } else { Self::interactive() }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::interactive()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: IdentityToken,
    fetched_at: DateTime<Utc>,
}

/// Acquires, validates and caches identity tokens for one harness run.
pub struct IdentityTokenProvider<S, C = SystemClock> {
    source: S,
    clock: C,
    min_validity: Duration,
    retry: RetryPolicy,
    skip_signing: bool,
    cancel: CancellationFlag,
    cache: Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> IdentityTokenProvider<S> {
    /// Creates a provider on the system clock with default settings.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SystemClock)
    }
}

impl<S: TokenSource, C: Clock> IdentityTokenProvider<S, C> {
    /// Creates a provider on an explicit clock.
    #[must_use]
    pub fn with_clock(source: S, clock: C) -> Self {
        Self {
            source,
            clock,
            min_validity: DEFAULT_MIN_VALIDITY,
            retry: RetryPolicy::default(),
            skip_signing: false,
            cancel: CancellationFlag::new(),
            cache: Mutex::new(None),
        }
    }

    /// Sets the minimum remaining validity.
    #[must_use]
    pub const fn min_validity(mut self, min_validity: Duration) -> Self {
        self.min_validity = min_validity;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Disables signing: [`Self::token`] returns `None` without fetching.
    #[must_use]
    pub const fn skip_signing(mut self, skip_signing: bool) -> Self {
        self.skip_signing = skip_signing;
        self
    }

    /// Shares a cancellation flag with the caller.
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The clock in use.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// When the cached token was fetched, if one is cached.
    #[must_use]
    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|cached| cached.fetched_at)
    }

    /// Returns a token valid for at least `min_validity`, or `None` when
    /// signing is skipped.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the source fails, returns a malformed
    /// token, the retry window closes, or acquisition is cancelled.
    pub fn token(&self) -> Result<Option<IdentityToken>, TokenError> {
        if self.skip_signing {
            return Ok(None);
        }

        let mut cache = self.cache.lock().map_err(|_| TokenError::LockPoisoned)?;
        if let Some(cached) = cache.as_ref() {
            if cached.token.is_usable(self.clock.now(), self.min_validity) {
                debug!(expiry = %cached.token.expiry(), "reusing cached identity token");
                return Ok(Some(cached.token.clone()));
            }
            debug!(expiry = %cached.token.expiry(), "cached identity token expires too early");
        }

        let token = self.acquire()?;
        *cache = Some(CachedToken {
            token: token.clone(),
            fetched_at: self.clock.now(),
        });
        Ok(Some(token))
    }

    fn acquire(&self) -> Result<IdentityToken, TokenError> {
        let start = self.clock.now();
        let window = TimeDelta::from_std(self.retry.max_retry_time).unwrap_or(TimeDelta::MAX);
        let deadline = start.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut attempts: u32 = 0;

        while self.clock.now() <= deadline {
            if self.cancel.is_cancelled() {
                return Err(TokenError::Cancelled);
            }
            attempts = attempts.saturating_add(1);

            match self.source.fetch()? {
                TokenFetch::Ready(raw) => {
                    let token = IdentityToken::parse(raw.expose_secret())?;
                    if token.is_usable(self.clock.now(), self.min_validity) {
                        info!(
                            source = self.source.name(),
                            attempts,
                            expiry = %token.expiry(),
                            "acquired identity token"
                        );
                        return Ok(token);
                    }
                    warn!(
                        source = self.source.name(),
                        expiry = %token.expiry(),
                        "current token expires too early, retrying in {}s",
                        self.retry.retry_sleep.as_secs()
                    );
                },
                TokenFetch::Stale { reason } => {
                    warn!(
                        source = self.source.name(),
                        %reason,
                        "no fresh token yet, retrying in {}s",
                        self.retry.retry_sleep.as_secs()
                    );
                },
            }

            self.sleep_cancellable(self.retry.retry_sleep)?;
        }

        let waited = self.clock.now().signed_duration_since(start);
        Err(TokenError::Timeout {
            waited_secs: u64::try_from(waited.num_seconds()).unwrap_or(0),
            attempts,
        })
    }

    fn sleep_cancellable(&self, total: Duration) -> Result<(), TokenError> {
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.cancel.is_cancelled() {
                return Err(TokenError::Cancelled);
            }
            let step = remaining.min(CANCEL_CHECK_INTERVAL);
            self.clock.sleep(step);
            remaining -= step;
        }
        Ok(())
    }
}
