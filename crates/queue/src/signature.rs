//! Delivery-signature sign and verify
//!
//! The bus signs the job body; the worker refuses unsigned deliveries. The
//! header value is `v1=<b64url(sha256(body))>.<b64url(hmac(key, digest))>`:
//! the first part binds the signature to the exact body, the second
//! authenticates it. Verification accepts the current or the next signing
//! key so keys can rotate without dropping in-flight deliveries.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "upstash-signature";

type HmacSha256 = Hmac<Sha256>;

fn body_digest(body: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(body))
}

fn digest_mac(key: &str, digest_b64: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(digest_b64.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Produce the signature header value for a body.
pub fn sign_body(body: &[u8], signing_key: &str) -> String {
    let digest = body_digest(body);
    let mac = digest_mac(signing_key, &digest);
    format!("v1={}.{}", digest, URL_SAFE_NO_PAD.encode(mac))
}

/// Verify a signature header against a body under the current or next
/// signing key. Comparison is constant-time.
pub fn verify_signature(
    body: &[u8],
    header_value: &str,
    current_key: &str,
    next_key: &str,
) -> bool {
    let Some(rest) = header_value.strip_prefix("v1=") else {
        return false;
    };
    let Some((digest_part, sig_part)) = rest.split_once('.') else {
        return false;
    };

    // The signed digest must match the body actually delivered
    if digest_part != body_digest(body) {
        return false;
    }

    let Ok(sig) = URL_SAFE_NO_PAD.decode(sig_part.as_bytes()) else {
        return false;
    };

    for key in [current_key, next_key] {
        if key.is_empty() {
            continue;
        }
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(digest_part.as_bytes());
        if mac.verify_slice(&sig).is_ok() {
            return true;
        }
    }
    false
}
