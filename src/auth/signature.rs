//! Webhook signature verification (`X-Hub-Signature-256`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Returns `true` if `header` is `sha256=<hex>` where `<hex>` is the
/// HMAC-SHA256 of `body` under `secret`.
///
/// The digest comparison is constant-time.
#[must_use]
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the `sha256=<hex>` header value for `body`.
///
/// Used by tests and by tooling that replays webhooks.
#[must_use]
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn matches_published_test_vector() {
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert!(verify_signature(SECRET, BODY, header));
        assert_eq!(sign(SECRET, BODY), header);
    }

    #[test]
    fn rejects_tampered_body() {
        let header = sign(SECRET, BODY);
        assert!(!verify_signature(SECRET, b"Hello, World?", &header));
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = sign(b"other", BODY);
        assert!(!verify_signature(SECRET, BODY, &header));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(!verify_signature(SECRET, BODY, ""));
        assert!(!verify_signature(SECRET, BODY, "sha1=abcdef"));
        assert!(!verify_signature(SECRET, BODY, "sha256=not-hex"));
        assert!(!verify_signature(SECRET, BODY, "sha256="));
    }
}
