//! Provider-level tests for the identity token lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::identity::{
    CancellationFlag, IdentityTokenProvider, ManualClock, MockTokenSource, RetryPolicy,
    TokenError, TokenFetch, unsigned_token,
};

fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

fn expiring_in(secs: i64) -> String {
    unsigned_token(start() + TimeDelta::seconds(secs))
}

#[test]
fn test_skip_signing_never_fetches() {
    let source = Arc::new(MockTokenSource::new([]));
    let provider =
        IdentityTokenProvider::with_clock(Arc::clone(&source), ManualClock::new(start()))
            .skip_signing(true);

    assert!(provider.token().unwrap().is_none());
    assert_eq!(source.fetch_count(), 0);
}

#[test]
fn test_fresh_token_is_returned_and_cached() {
    let source = Arc::new(MockTokenSource::repeating(&expiring_in(600), 1));
    let provider =
        IdentityTokenProvider::with_clock(Arc::clone(&source), ManualClock::new(start()));

    let first = provider.token().unwrap().unwrap();
    let second = provider.token().unwrap().unwrap();

    assert_eq!(first.expose(), second.expose());
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(provider.cached_at(), Some(start()));
}

#[test]
fn test_cached_token_refreshed_when_near_expiry() {
    let old = expiring_in(60);
    let new = expiring_in(900);
    let source = Arc::new(MockTokenSource::new([
        Ok(TokenFetch::ready(old.clone())),
        Ok(TokenFetch::ready(new.clone())),
    ]));
    let clock = Arc::new(ManualClock::new(start()));
    let provider = IdentityTokenProvider::with_clock(Arc::clone(&source), Arc::clone(&clock));

    assert_eq!(provider.token().unwrap().unwrap().expose(), old);

    // 45s later the old token has 15s left, under the 20s minimum.
    clock.advance(Duration::from_secs(45));
    assert_eq!(provider.token().unwrap().unwrap().expose(), new);
    assert_eq!(source.fetch_count(), 2);
}

#[test]
fn test_min_validity_controls_acceptance() {
    let source = Arc::new(MockTokenSource::repeating(&expiring_in(10), 1));
    let provider =
        IdentityTokenProvider::with_clock(Arc::clone(&source), ManualClock::new(start()))
            .min_validity(Duration::from_secs(5));
    assert!(provider.token().unwrap().is_some());

    let source = MockTokenSource::repeating(&expiring_in(10), 100);
    let provider = IdentityTokenProvider::with_clock(source, ManualClock::new(start()))
        .min_validity(Duration::from_secs(20));
    assert!(matches!(
        provider.token(),
        Err(TokenError::Timeout { .. })
    ));
}

#[test]
fn test_stale_fetches_are_retried_with_backoff() {
    let source = Arc::new(MockTokenSource::new([
        Ok(TokenFetch::stale("run in progress")),
        Ok(TokenFetch::stale("run in progress")),
        Ok(TokenFetch::ready(expiring_in(600))),
    ]));
    let clock = Arc::new(ManualClock::new(start()));
    let provider = IdentityTokenProvider::with_clock(Arc::clone(&source), Arc::clone(&clock))
        .retry_policy(RetryPolicy::ci());

    assert!(provider.token().unwrap().is_some());
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(clock.total_slept(), Duration::from_secs(60));
}

#[test]
fn test_retry_window_is_bounded() {
    let source = Arc::new(MockTokenSource::new(
        (0..100).map(|_| Ok(TokenFetch::stale("run in progress"))),
    ));
    let clock = Arc::new(ManualClock::new(start()));
    let provider = IdentityTokenProvider::with_clock(Arc::clone(&source), Arc::clone(&clock))
        .retry_policy(RetryPolicy {
            max_retry_time: Duration::from_secs(60),
            retry_sleep: Duration::from_secs(5),
        });

    let Err(TokenError::Timeout {
        waited_secs,
        attempts,
    }) = provider.token()
    else {
        panic!("expected timeout");
    };
    assert_eq!(attempts, 13);
    assert_eq!(waited_secs, 65);
    assert_eq!(source.fetch_count(), 13);
    assert!(provider.cached_at().is_none());
}

#[test]
fn test_malformed_token_aborts_without_retry() {
    let source = Arc::new(MockTokenSource::new([
        Ok(TokenFetch::ready("not-a-jwt")),
        Ok(TokenFetch::ready(expiring_in(600))),
    ]));
    let provider =
        IdentityTokenProvider::with_clock(Arc::clone(&source), ManualClock::new(start()));

    assert!(matches!(
        provider.token(),
        Err(TokenError::Malformed { .. })
    ));
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn test_source_errors_abort_without_retry() {
    let source = Arc::new(MockTokenSource::new([
        Err(TokenError::ArtifactCount {
            expected: 1,
            found: 2,
        }),
        Ok(TokenFetch::ready(expiring_in(600))),
    ]));
    let provider =
        IdentityTokenProvider::with_clock(Arc::clone(&source), ManualClock::new(start()));

    assert!(matches!(
        provider.token(),
        Err(TokenError::ArtifactCount {
            expected: 1,
            found: 2
        })
    ));
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn test_cancellation_stops_polling() {
    let source = Arc::new(MockTokenSource::new(
        (0..100).map(|_| Ok(TokenFetch::stale("run in progress"))),
    ));
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let provider =
        IdentityTokenProvider::with_clock(Arc::clone(&source), ManualClock::new(start()))
            .cancellation(cancel);

    assert!(matches!(provider.token(), Err(TokenError::Cancelled)));
    assert_eq!(source.fetch_count(), 0);
}

#[test]
fn test_retry_policy_presets() {
    assert_eq!(RetryPolicy::for_environment(true), RetryPolicy::ci());
    assert_eq!(RetryPolicy::for_environment(false), RetryPolicy::interactive());
    assert!(RetryPolicy::ci().max_retry_time > RetryPolicy::interactive().max_retry_time);
}
