//! HMAC-SHA256 request signing and verification.
//!
//! Client submissions are signed over `method ∥ path ∥ body ∥ timestamp` with
//! a shared secret. The timestamp bounds the replay window to ±5 minutes.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed clock drift between client and server, in seconds.
pub const MAX_DRIFT_SECS: i64 = 300;

/// Errors produced by request signature verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid request signature")]
    InvalidSignature,

    #[error("request timestamp expired or too far in future")]
    Expired,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Computes the hex-encoded HMAC-SHA256 signature for a request.
///
/// The signed payload is the concatenation of the HTTP method, the URL path,
/// the raw body, and the unix timestamp string.
pub fn sign(secret: &str, method: &str, path: &str, body: &[u8], timestamp: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body);
    mac.update(timestamp.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies the authenticity and freshness of a signed request.
///
/// An empty secret disables verification entirely. This is an explicit
/// development escape hatch and must not be the production default.
pub fn verify(
    secret: &str,
    method: &str,
    path: &str,
    body: &[u8],
    timestamp: &str,
    signature: &str,
) -> Result<(), SignatureError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    verify_at(secret, method, path, body, timestamp, signature, now)
}

/// Verifies a signed request against a fixed server time.
///
/// Useful for testing with deterministic timestamps.
pub fn verify_at(
    secret: &str,
    method: &str,
    path: &str,
    body: &[u8],
    timestamp: &str,
    signature: &str,
    now_unix: i64,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Ok(());
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_string()))?;

    let drift = now_unix - ts;
    if !(-MAX_DRIFT_SECS..=MAX_DRIFT_SECS).contains(&drift) {
        return Err(SignatureError::Expired);
    }

    // The comparison is against the literal lowercase hex text produced by
    // `sign`; uppercase digits are a different signature, not an alternate
    // spelling of the same one.
    if !signature
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(SignatureError::InvalidSignature);
    }
    let provided = hex::decode(signature).map_err(|_| SignatureError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body);
    mac.update(timestamp.as_bytes());

    // verify_slice compares in constant time.
    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_round_trip_verifies() {
        let ts = "1700000000";
        let sig = sign(SECRET, "POST", "/export", b"{\"query\":\"SELECT 1\"}", ts);
        let result = verify_at(
            SECRET,
            "POST",
            "/export",
            b"{\"query\":\"SELECT 1\"}",
            ts,
            &sig,
            1_700_000_000,
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let ts = "1700000000";
        let sig = sign("other-secret", "POST", "/export", b"body", ts);
        let result = verify_at(SECRET, "POST", "/export", b"body", ts, &sig, 1_700_000_000);
        assert_eq!(result, Err(SignatureError::InvalidSignature));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let ts = "1700000000";
        let sig = sign(SECRET, "POST", "/export", b"body", ts);
        let result = verify_at(SECRET, "POST", "/export", b"tampered", ts, &sig, 1_700_000_000);
        assert_eq!(result, Err(SignatureError::InvalidSignature));
    }

    #[test]
    fn test_timestamp_ten_minutes_past_expired() {
        let ts = "1700000000";
        let sig = sign(SECRET, "POST", "/export", b"body", ts);
        let result = verify_at(
            SECRET,
            "POST",
            "/export",
            b"body",
            ts,
            &sig,
            1_700_000_000 + 600,
        );
        assert_eq!(result, Err(SignatureError::Expired));
    }

    #[test]
    fn test_timestamp_far_future_expired() {
        let ts = "1700000600";
        let sig = sign(SECRET, "POST", "/export", b"body", ts);
        let result = verify_at(SECRET, "POST", "/export", b"body", ts, &sig, 1_700_000_000);
        assert_eq!(result, Err(SignatureError::Expired));
    }

    #[test]
    fn test_drift_at_window_edge_accepted() {
        let ts = "1700000000";
        let sig = sign(SECRET, "POST", "/export", b"body", ts);
        let result = verify_at(
            SECRET,
            "POST",
            "/export",
            b"body",
            ts,
            &sig,
            1_700_000_000 + MAX_DRIFT_SECS,
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_malformed_timestamp_rejected() {
        let result = verify_at(SECRET, "POST", "/export", b"body", "not-a-ts", "00", 0);
        assert!(matches!(result, Err(SignatureError::InvalidTimestamp(_))));
    }

    #[test]
    fn test_uppercase_hex_signature_rejected() {
        let ts = "1700000000";
        let sig = sign(SECRET, "POST", "/export", b"body", ts).to_uppercase();
        let result = verify_at(SECRET, "POST", "/export", b"body", ts, &sig, 1_700_000_000);
        assert_eq!(result, Err(SignatureError::InvalidSignature));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        let result = verify_at(
            SECRET,
            "POST",
            "/export",
            b"body",
            "1700000000",
            "zzzz",
            1_700_000_000,
        );
        assert_eq!(result, Err(SignatureError::InvalidSignature));
    }

    #[test]
    fn test_empty_secret_skips_verification() {
        let result = verify_at("", "POST", "/export", b"body", "bogus", "bogus", 0);
        assert_eq!(result, Ok(()));
    }
}
