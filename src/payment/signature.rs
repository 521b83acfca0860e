//! Webhook signature verification (HMAC-SHA256, `t=<unix>,v1=<hex>` header).

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Why a webhook signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Header lacks a timestamp or a `v1` signature.
    #[error("malformed signature header")]
    MalformedHeader,

    /// The timestamp is not an integer.
    #[error("invalid signature timestamp")]
    InvalidTimestamp,

    /// No `v1` signature matched the payload.
    #[error("signature mismatch")]
    Mismatch,

    /// The signature is valid but outside the tolerance window.
    #[error("signature timestamp outside tolerance ({age_secs}s)")]
    Expired {
        /// Absolute distance between the signed timestamp and now.
        age_secs: u64,
    },

    /// The signing secret cannot key the MAC.
    #[error("invalid signing secret")]
    InvalidSecret,
}

/// Verifies `header` against `payload` using the current time.
///
/// # Errors
///
/// A [`SignatureError`] describing the first check that failed.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    verify_webhook_signature_at(payload, header, secret, tolerance_secs, Utc::now().timestamp())
}

/// Verifies `header` against `payload` as of `now` (unix seconds).
///
/// The header may carry several `v1=` entries (secret rotation); any match
/// is accepted. Comparison is constant-time.
///
/// # Errors
///
/// A [`SignatureError`] describing the first check that failed.
pub fn verify_webhook_signature_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    let Some(timestamp) = timestamp else {
        return Err(SignatureError::MalformedHeader);
    };
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;

    let mac = keyed_mac(secret, timestamp, payload)?;
    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    let age_secs = now.abs_diff(signed_at);
    if age_secs > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::Expired { age_secs });
    }

    Ok(())
}

/// Produces a header value for `payload` signed at `timestamp`.
///
/// # Errors
///
/// [`SignatureError::InvalidSecret`] if the secret cannot key the MAC.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let timestamp = timestamp.to_string();
    let mac = keyed_mac(secret, &timestamp, payload)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}

/// MAC over `"{timestamp}.{payload}"`.
fn keyed_mac(secret: &str, timestamp: &str, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}
