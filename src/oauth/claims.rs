//! Unverified JWT claims extraction
//!
//! Signature verification happens elsewhere; these helpers only read the payload
//! segment so callers can cache claims and derive lifetimes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;

/// Decoded JWT payload
pub type Claims = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token must have 3 segments, found {0}")]
    Segments(usize),
    #[error("payload is not valid base64url: {0}")]
    Base64(String),
    #[error("payload is not a JSON object: {0}")]
    Json(String),
}

/// Decode the payload segment of a three-part JWT
///
/// # Errors
///
/// Returns an error if the token does not have three segments, or its payload is not
/// base64url-encoded JSON object.
pub fn extract_claims(token: &str) -> Result<Claims, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::Segments(segments.len()));
    }

    // Some issuers pad the segments anyway
    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ClaimsError::Base64(e.to_string()))?;

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(claims)) => Ok(claims),
        Ok(other) => Err(ClaimsError::Json(format!("found {other}"))),
        Err(e) => Err(ClaimsError::Json(e.to_string())),
    }
}

/// Remaining lifetime according to the `exp` claim
///
/// `None` when `exp` is absent, not a number, or already in the past.
#[must_use]
pub fn ttl_from_claims(claims: &Claims) -> Option<Duration> {
    let exp = claims.get("exp")?.as_i64()?;
    let remaining = exp.saturating_sub(Utc::now().timestamp());
    u64::try_from(remaining)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// String claim, if present
#[must_use]
pub fn claim_str<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get(name).and_then(serde_json::Value::as_str)
}
