// Cryptographic utilities for generating challenges and identifiers

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

/// Entropy carried by a ceremony challenge (256 bits)
pub const CHALLENGE_SIZE: usize = 32;

/// Byte length of the random part of a generated serial number
const SERIAL_RANDOM_BYTES: usize = 8;

/// Prefix stamped onto generated serial numbers
const SERIAL_PREFIX: &str = "FT-";

/// Generate a cryptographically secure nonce of the given byte length
///
/// # Returns
///
/// A base64url-encoded string (no padding) representing `length` bytes of
/// cryptographically secure random data
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    URL_SAFE_NO_PAD.encode(nonce)
}

/// Generate a fresh ceremony challenge value
///
/// 32 bytes (256 bits) of entropy, base64url-encoded without padding, matching
/// the transport encoding used for every WebAuthn binary field.
#[must_use]
pub fn generate_challenge() -> String {
    generate_nonce(CHALLENGE_SIZE)
}

/// Generate an opaque security key serial number
///
/// Format: `FT-` followed by 16 uppercase hex characters. Uniqueness is
/// enforced by the credential repository, not here; a collision surfaces as a
/// retryable conflict at insert time.
#[must_use]
pub fn generate_serial_number() -> String {
    let mut raw = [0u8; SERIAL_RANDOM_BYTES];
    rand::rng().fill_bytes(&mut raw);
    format!("{SERIAL_PREFIX}{}", hex::encode_upper(raw))
}
