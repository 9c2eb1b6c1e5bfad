//! Webhook signature validation: HMAC-SHA256 over the exact raw body, with
//! constant-time comparison.
//!
//! Providers differ in how they present the signature: a bare hex digest, a
//! `sha256=`-prefixed header, or a base64 digest. All comparisons go through
//! `subtle` so verification time does not leak prefix matches.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

fn hmac_digest(secret: &[u8], raw_body: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(raw_body);
    mac.finalize().into_bytes().to_vec()
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

/// Validates a signature header against the raw body. Accepts hex (with or
/// without a `sha256=` prefix) and base64 digests.
pub fn validate_signature(secret: &str, raw_body: &[u8], signature: &str) -> bool {
    let expected = hmac_digest(secret.as_bytes(), raw_body);
    let candidate = signature.trim().strip_prefix("sha256=").unwrap_or(signature.trim());

    if let Ok(decoded) = hex::decode(candidate) {
        if ct_eq(&decoded, &expected) {
            return true;
        }
    }
    if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(candidate) {
        if ct_eq(&decoded, &expected) {
            return true;
        }
    }
    false
}

/// Computes the hex signature a provider would send for `raw_body`. Used by
/// tests and by outbound webhook registration.
pub fn sign_hex(secret: &str, raw_body: &[u8]) -> String {
    hex::encode(hmac_digest(secret.as_bytes(), raw_body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_hex_signature_passes() {
        let body = br#"{"message_sid": "SM1"}"#;
        let sig = sign_hex("topsecret", body);
        assert!(validate_signature("topsecret", body, &sig));
    }

    #[test]
    fn sha256_prefixed_signature_passes() {
        let body = b"payload";
        let sig = format!("sha256={}", sign_hex("k", body));
        assert!(validate_signature("k", body, &sig));
    }

    #[test]
    fn base64_signature_passes() {
        let body = b"payload";
        let digest = hmac_digest(b"k", body);
        let sig = base64::engine::general_purpose::STANDARD.encode(digest);
        assert!(validate_signature("k", body, &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let sig = sign_hex("right", body);
        assert!(!validate_signature("wrong", body, &sig));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign_hex("k", b"original");
        assert!(!validate_signature("k", b"tampered", &sig));
    }

    #[test]
    fn garbage_signature_fails() {
        assert!(!validate_signature("k", b"body", "not-a-digest"));
    }
}
