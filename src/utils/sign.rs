//! HMAC-SHA256 request signatures.
//!
//! The signed string is the request path and query followed by the
//! timestamp header value; the signature is lowercase hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const SIGN_HEADER: &str = "X-Sign";

type HmacSha256 = Hmac<Sha256>;

pub fn sign(secret: &str, base: &str) -> String {
    // keys of any length are accepted
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(base.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of `signature` against the expected value.
pub fn verify(secret: &str, base: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(base.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
