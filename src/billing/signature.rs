//! Verification of the billing provider's webhook signatures.
//!
//! The provider signs `"{timestamp}.{payload}"` with HMAC-SHA256 over the
//! shared endpoint secret and sends `t=<unix>,v1=<hex>` in a header.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

use crate::Error;

type HmacSha256 = Hmac<Sha256>;

/// The header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "billing-signature";

/// How far a signature timestamp may drift from the server clock before the
/// event is rejected as a replay.
const TIMESTAMP_TOLERANCE: Duration = Duration::minutes(5);

/// Check `header` against `payload` and the shared `secret`.
///
/// # Errors
/// Returns [Error::InvalidSignature] when the header is malformed, the
/// timestamp is outside the tolerance window, or the digest does not match.
/// No distinction is made between the cases; the provider retries all of
/// them the same way.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: OffsetDateTime,
) -> Result<(), Error> {
    let (timestamp, digest) = parse_header(header).ok_or(Error::InvalidSignature)?;

    let age = now.unix_timestamp() - timestamp;
    if age.abs() > TIMESTAMP_TOLERANCE.whole_seconds() {
        return Err(Error::InvalidSignature);
    }

    let digest = hex::decode(digest).map_err(|_| Error::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::InvalidSignature)?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);

    // verify_slice is a constant-time comparison.
    mac.verify_slice(&digest).map_err(|_| Error::InvalidSignature)
}

/// Build a signature header for `payload`.
///
/// The inverse of [verify_signature]; used by tests and local tooling that
/// plays the provider's role.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);

    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn parse_header(header: &str) -> Option<(i64, &str)> {
    let mut timestamp = None;
    let mut digest = None;

    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => digest = Some(value),
            _ => {}
        }
    }

    Some((timestamp?, digest?))
}
