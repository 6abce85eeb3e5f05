//! HMAC-SHA256 request signing for `/sync`.
//!
//! The signature covers `timestamp || body` and is sent as lowercase hex next
//! to the RFC3339 timestamp it was computed over. A responder accepts a request
//! only when the signature matches and the timestamp lies within
//! [`MAX_CLOCK_SKEW_SECS`] of its own clock, in either direction.

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Site-Sync-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Site-Sync-Signature";

/// Largest accepted distance between the request timestamp and local time.
pub const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),
    #[error("timestamp outside the accepted window ({skew_secs}s skew)")]
    StaleTimestamp { skew_secs: i64 },
    #[error("signature mismatch")]
    Mismatch,
    #[error("unusable signing key")]
    InvalidKey,
}

/// Header values for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub signature: String,
}

fn mac_for(token: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(token.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(body);
    Ok(mac)
}

/// Lowercase hex HMAC-SHA256 of `timestamp || body` under `token`.
pub fn sign(token: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mac = mac_for(token, timestamp, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of `signature` against `timestamp || body`.
pub fn verify(token: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    match mac_for(token, timestamp, body) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

/// Formats `now` the way the client sends it.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses `timestamp` and checks it against the skew window around `now`.
pub fn check_timestamp(timestamp: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, SignatureError> {
    let parsed = DateTime::parse_from_rfc3339(timestamp.trim())
        .map_err(|err| SignatureError::MalformedTimestamp(err.to_string()))?
        .with_timezone(&Utc);

    let skew = now - parsed;
    let window = chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS);
    if skew > window || skew < -window {
        return Err(SignatureError::StaleTimestamp {
            skew_secs: skew.num_seconds(),
        });
    }
    Ok(parsed)
}

/// Full responder-side validation: freshness first, then the signature.
pub fn validate_request(
    token: &str,
    timestamp: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
    let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

    check_timestamp(timestamp, now)?;

    if verify(token, timestamp, body, signature) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Client-side helper producing both headers for a request sent at `now`.
pub fn sign_request(
    token: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedHeaders, SignatureError> {
    let timestamp = format_timestamp(now);
    let signature = sign(token, &timestamp, body)?;
    Ok(SignedHeaders {
        timestamp,
        signature,
    })
}
