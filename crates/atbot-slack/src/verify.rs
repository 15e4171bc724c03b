//! Slack request signing: `v0=hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SlackError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests older (or newer) than this are rejected as possible replays.
pub const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;

/// Check a request against the signing secret. `now` is the current Unix
/// time in seconds.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now: i64,
) -> Result<(), SlackError> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SlackError::BadSignature("timestamp is not a number".into()))?;
    if now.abs_diff(ts) > MAX_CLOCK_SKEW_SECS.unsigned_abs() {
        return Err(SlackError::BadSignature("timestamp outside the allowed window".into()));
    }

    let sig_hex = signature
        .strip_prefix("v0=")
        .ok_or_else(|| SlackError::BadSignature("unsupported signature version".into()))?;
    let expected = hex::decode(sig_hex)
        .map_err(|_| SlackError::BadSignature("signature is not valid hex".into()))?;

    mac_for(secret, timestamp, body)?
        .verify_slice(&expected)
        .map_err(|_| SlackError::BadSignature("signature mismatch".into()))
}

/// Produce the `X-Slack-Signature` value for a request.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SlackError> {
    let mac = mac_for(secret, timestamp, body)?;
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SlackError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SlackError::BadSignature("invalid signing secret".into()))?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}
