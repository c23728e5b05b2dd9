//! Payment webhook signatures.
//!
//! The gateway signs the raw request body with HMAC-SHA512, keyed with the merchant secret key, and sends the
//! lowercase hex digest in the `x-paystack-signature` header.
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

pub fn calculate_webhook_signature(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `signature` (hex) against the HMAC of `body`. The comparison is constant-time.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        debug!("🔐️ Webhook signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
