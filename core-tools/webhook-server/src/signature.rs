//! Webhook signature verification
//!
//! Linear and GitHub both sign the raw request body with HMAC-SHA256 and send
//! the hex digest in a header, GitHub with a `sha256=` prefix.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify `header` against the HMAC-SHA256 of `body` keyed by `secret`
///
/// Comparison is constant-time. A header that is not valid hex fails.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let digest = header.trim();
    let digest = digest.strip_prefix("sha256=").unwrap_or(digest);

    let expected = match hex::decode(digest) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 of `body`, as a sender would compute it
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
