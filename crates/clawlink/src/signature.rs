//! Handshake signing and base64url helpers.
//!
//! Wire contract: the signed payload is `v1|<nonce>|<signedAtMs>` and the MAC
//! is HMAC-SHA256 keyed with the UTF-8 secret. Signatures travel base64url
//! encoded without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 signature in bytes.
pub const SIGNATURE_LEN: usize = 32;

const PAYLOAD_VERSION: &str = "v1";
const NONCE_BYTES: usize = 16;

/// Build the canonical payload that gets signed.
#[must_use]
pub fn device_auth_payload(nonce: &str, signed_at_ms: u64) -> String {
    format!("{PAYLOAD_VERSION}|{nonce}|{signed_at_ms}")
}

/// Compute the handshake signature over `nonce` and `signed_at_ms`.
#[must_use]
pub fn sign(nonce: &str, signed_at_ms: u64, secret: &str) -> [u8; SIGNATURE_LEN] {
    // HMAC accepts keys of any length, new_from_slice cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return [0; SIGNATURE_LEN],
    };
    mac.update(device_auth_payload(nonce, signed_at_ms).as_bytes());
    let mut out = [0u8; SIGNATURE_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Sign and encode in one step, as sent on the wire.
#[must_use]
pub fn sign_encoded(nonce: &str, signed_at_ms: u64, secret: &str) -> String {
    base64_url_encode(&sign(nonce, signed_at_ms, secret))
}

/// Check a base64url signature in constant time.
#[must_use]
pub fn verify(nonce: &str, signed_at_ms: u64, secret: &str, signature: &str) -> bool {
    let mut decoded = [0u8; SIGNATURE_LEN];
    if base64_url_decode(signature, &mut decoded).is_err() {
        return false;
    }
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(device_auth_payload(nonce, signed_at_ms).as_bytes());
    mac.verify_slice(&decoded).is_ok()
}

/// Encode bytes as URL-safe base64 without padding.
#[must_use]
pub fn base64_url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode URL-safe base64 into `out`, which must be exactly the decoded size.
///
/// Trailing `=` padding is tolerated.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidEncoding`] on malformed input or when the
/// decoded length differs from `out.len()`.
pub fn base64_url_decode(input: &str, out: &mut [u8]) -> Result<()> {
    let trimmed = input.trim().trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| GatewayError::InvalidEncoding(e.to_string()))?;
    if decoded.len() != out.len() {
        return Err(GatewayError::InvalidEncoding(format!(
            "expected {} bytes, decoded {}",
            out.len(),
            decoded.len()
        )));
    }
    out.copy_from_slice(&decoded);
    Ok(())
}

/// Lowercase hex SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fresh random handshake nonce.
#[must_use]
pub fn generate_nonce() -> String {
    random_token(NONCE_BYTES)
}

/// `len` random bytes from the OS, base64url encoded.
#[must_use]
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    base64_url_encode(&bytes)
}
