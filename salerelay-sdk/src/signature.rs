//! Request signing for the relay ingress and token checks for subscribers.
//!
//! When the relay is configured with an ingress secret, every submission
//! carries a signature header:
//!
//! ```text
//! Relay-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{timestamp}.{raw_body}", secret)`.

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Relay-Signature";

/// Maximum allowed distance between a signature timestamp and now (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn hmac_key(key: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key)
}

fn signed_data(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut data = format!("{timestamp}.").into_bytes();
    data.extend_from_slice(body);
    data
}

// ---------------------------------------------------------------------------
// Body signing
// ---------------------------------------------------------------------------

/// Sign a raw request body with the current timestamp.
///
/// Returns the formatted `Relay-Signature` header value.
pub fn sign_body(body: &[u8], key: &[u8]) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    sign_body_at(timestamp, body, key)
}

/// Sign a raw request body with an explicit timestamp.
pub fn sign_body_at(timestamp: i64, body: &[u8], key: &[u8]) -> String {
    let sig = ring::hmac::sign(&hmac_key(key), &signed_data(timestamp, body));
    format_signature_header(timestamp, sig.as_ref())
}

/// Verify a `Relay-Signature` header value against the raw request body.
///
/// Checks the HMAC first, then timestamp freshness.
pub fn verify_body(header_value: &str, body: &[u8], key: &[u8]) -> Result<(), SignatureError> {
    let (timestamp, signature) = parse_signature_header(header_value)?;
    ring::hmac::verify(&hmac_key(key), &signed_data(timestamp, body), &signature)?;
    check_timestamp(timestamp)
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `Relay-Signature` header value (`{timestamp}.{base64}`) into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, signature) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(signature)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`] of now.
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if (now - timestamp).abs() > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subscriber tokens
// ---------------------------------------------------------------------------

/// Compare a presented subscriber token with the configured one in
/// constant time.
pub fn verify_token(presented: &str, expected: &str) -> bool {
    let key = hmac_key(expected.as_bytes());
    let tag = ring::hmac::sign(&key, expected.as_bytes());
    ring::hmac::verify(&key, presented.as_bytes(), tag.as_ref()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"relay-secret";
    const BODY: &[u8] = br#"{"amount":250,"date":"2024-06-01","time":"14:30"}"#;

    #[test]
    fn signed_body_verifies() {
        let header = sign_body(BODY, KEY);
        assert!(verify_body(&header, BODY, KEY).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign_body(BODY, KEY);
        let err = verify_body(&header, b"{}", KEY).unwrap_err();
        assert!(matches!(err, SignatureError::SignatureMismatch));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let header = sign_body(BODY, KEY);
        assert!(verify_body(&header, BODY, b"other").is_err());
    }

    #[test]
    fn stale_signature_is_expired() {
        let old = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 10;
        let header = sign_body_at(old, BODY, KEY);
        let err = verify_body(&header, BODY, KEY).unwrap_err();
        assert!(matches!(err, SignatureError::Expired));
    }

    #[test]
    fn malformed_headers() {
        assert!(matches!(
            parse_signature_header("no-dot"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("abc.AAAA"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("123.!!!"),
            Err(SignatureError::InvalidBase64)
        ));
    }

    #[test]
    fn token_comparison() {
        assert!(verify_token("dashboard", "dashboard"));
        assert!(!verify_token("dashboar", "dashboard"));
        assert!(!verify_token("", "dashboard"));
    }
}
