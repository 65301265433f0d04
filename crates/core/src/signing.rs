//! Webhook HMAC signing.
//!
//! Every outbound webhook body is signed with the webhook's shared secret.
//! Receivers recompute the HMAC over the raw body they received and compare
//! it with the signature header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature, formatted as `sha256=<hex>`.
pub const SIGNATURE_HEADER: &str = "X-Herald-Signature";

/// Header carrying the event type of the delivery.
pub const EVENT_HEADER: &str = "X-Herald-Event";

/// Header carrying the queue entry id, stable across retries.
pub const DELIVERY_HEADER: &str = "X-Herald-Delivery";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the hex-encoded HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("{:x}", mac.finalize().into_bytes())
}

/// Value of the [`SIGNATURE_HEADER`] for `body`.
pub fn signature_header_value(secret: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", sign_payload(secret, body))
}

/// Check a [`SIGNATURE_HEADER`] value against `body` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Some(expected) = decode_hex(hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_hmac_vector() {
        let sig = sign_payload("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn header_value_is_prefixed() {
        let value = signature_header_value("s3cret", b"{}");
        assert!(value.starts_with("sha256="));
        assert_eq!(value.len(), "sha256=".len() + 64);
    }

    #[test]
    fn verify_accepts_own_signature_and_rejects_tampering() {
        let body = br#"{"type":"alert.triggered"}"#;
        let header = signature_header_value("s3cret", body);

        assert!(verify_signature("s3cret", body, &header));
        assert!(!verify_signature("other", body, &header));
        assert!(!verify_signature("s3cret", b"{}", &header));
        assert!(!verify_signature("s3cret", body, "md5=abcd"));
        assert!(!verify_signature("s3cret", body, "sha256=zz"));
    }

    #[test]
    fn empty_secret_still_signs() {
        assert_eq!(sign_payload("", b"x").len(), 64);
    }
}
