//! Slack request signature verification.
//!
//! Slack signs every event callback with
//! `v0=hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}"))` and sends the
//! timestamp in `X-Slack-Request-Timestamp`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use tacit_core::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Requests older than this are rejected as replays.
pub const MAX_SIGNATURE_AGE_SECS: i64 = 5 * 60;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";

/// Header carrying the request timestamp.
pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";

/// Compute the `v0=` signature for a request body.
pub fn slack_signature(secret: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("Invalid Slack signing secret: {}", e)))?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify an inbound Slack request against the current clock.
pub fn verify_slack_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
) -> Result<()> {
    verify_slack_signature_at(secret, timestamp, body, signature, Utc::now().timestamp())
}

/// Verify with an explicit "now" in unix seconds.
pub fn verify_slack_signature_at(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<()> {
    let sent: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| Error::NotAuthorized("Malformed Slack request timestamp".to_string()))?;
    if (now - sent).abs() > MAX_SIGNATURE_AGE_SECS {
        return Err(Error::NotAuthorized(
            "Slack request timestamp outside the accepted window".to_string(),
        ));
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(|| Error::NotAuthorized("Malformed Slack signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("Invalid Slack signing secret: {}", e)))?;
    mac.update(b"v0:");
    mac.update(timestamp.trim().as_bytes());
    mac.update(b":");
    mac.update(body);
    // Constant-time comparison.
    mac.verify_slice(&provided)
        .map_err(|_| Error::NotAuthorized("Slack signature mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&command=%2Fweather";

    #[test]
    fn test_signature_roundtrip_within_window() {
        let ts = "1531420618";
        let sig = slack_signature(SECRET, ts, BODY).unwrap();
        assert!(sig.starts_with("v0="));
        assert_eq!(sig.len(), 3 + 64);
        assert!(verify_slack_signature_at(SECRET, ts, BODY, &sig, 1531420618 + 30).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let ts = "1531420618";
        let sig = slack_signature(SECRET, ts, BODY).unwrap();
        let err = verify_slack_signature_at(SECRET, ts, b"token=evil", &sig, 1531420618)
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let ts = "1531420618";
        let sig = slack_signature(SECRET, ts, BODY).unwrap();
        let now = 1531420618 + MAX_SIGNATURE_AGE_SECS + 1;
        assert!(verify_slack_signature_at(SECRET, ts, BODY, &sig, now).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let ts = "1531420618";
        let sig = slack_signature("other", ts, BODY).unwrap();
        assert!(verify_slack_signature_at(SECRET, ts, BODY, &sig, 1531420618).is_err());
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(verify_slack_signature_at(SECRET, "abc", BODY, "v0=00", 0).is_err());
        assert!(verify_slack_signature_at(SECRET, "0", BODY, "sha256=00", 0).is_err());
        assert!(verify_slack_signature_at(SECRET, "0", BODY, "v0=zz", 0).is_err());
    }
}
