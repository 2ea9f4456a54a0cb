//! Identity token parsing and expiry checks.
//!
//! Tokens are JWT-shaped: three dot-separated base64url segments. Only the
//! claim set is inspected, and only for its `exp` claim. Signatures are not
//! checked; the signing infrastructure does that.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};

use super::error::TokenError;

/// Right-pads a base64 segment with `=` to a multiple of four characters.
#[must_use]
pub fn pad_base64(segment: &str) -> Cow<'_, str> {
    match segment.len() % 4 {
        0 => Cow::Borrowed(segment),
        rem => {
            let mut padded = String::with_capacity(segment.len() + 4 - rem);
            padded.push_str(segment);
            padded.extend(std::iter::repeat_n('=', 4 - rem));
            Cow::Owned(padded)
        },
    }
}

/// Decodes the `exp` claim of a JWT-shaped token.
///
/// # Errors
///
/// Returns [`TokenError::Malformed`] when the token has no claim segment, the
/// segment is not base64 JSON, or `exp` is missing or out of range.
pub fn decode_expiry(raw: &str) -> Result<DateTime<Utc>, TokenError> {
    let payload = raw
        .split('.')
        .nth(1)
        .ok_or_else(|| TokenError::malformed("token has no claim segment"))?;
    let padded = pad_base64(payload);
    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .or_else(|_| STANDARD.decode(padded.as_bytes()))
        .map_err(|error| TokenError::malformed(format!("claim segment is not base64: {error}")))?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|error| TokenError::malformed(format!("claim segment is not JSON: {error}")))?;
    let exp = claims
        .get("exp")
        .ok_or_else(|| TokenError::malformed("claim set has no exp claim"))?;

    #[allow(clippy::cast_possible_truncation)]
    let secs = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|value| value.floor() as i64))
        .ok_or_else(|| TokenError::malformed(format!("exp claim is not numeric: {exp}")))?;

    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| TokenError::malformed(format!("exp claim out of range: {secs}")))
}

/// Returns whether `raw` is still valid at `reference`.
///
/// # Errors
///
/// Returns [`TokenError::Malformed`] if the expiry cannot be decoded.
pub fn is_valid_at(raw: &str, reference: DateTime<Utc>) -> Result<bool, TokenError> {
    Ok(reference < decode_expiry(raw)?)
}

/// A bearer identity token together with its decoded expiry.
#[derive(Clone)]
pub struct IdentityToken {
    raw: SecretString,
    expiry: DateTime<Utc>,
}

impl IdentityToken {
    /// Parses a raw token, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] if the token is empty or its expiry
    /// cannot be decoded.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TokenError::malformed("token is empty"));
        }
        let expiry = decode_expiry(raw)?;
        Ok(Self {
            raw: SecretString::from(raw.to_owned()),
            expiry,
        })
    }

    /// When the token expires.
    #[must_use]
    pub const fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Whether the token is still valid at `reference`.
    #[must_use]
    pub fn is_valid_at(&self, reference: DateTime<Utc>) -> bool {
        reference < self.expiry
    }

    /// Whether the token stays valid for at least `min_validity` after `now`.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>, min_validity: Duration) -> bool {
        TimeDelta::from_std(min_validity)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .is_some_and(|reference| self.is_valid_at(reference))
    }

    /// The raw bearer string.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.raw.expose_secret()
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("raw", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}
