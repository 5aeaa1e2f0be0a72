//! Cryptographic utilities for device key hashing.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input and returns it as a hex string.
///
/// Device API keys are stored hashed; lookups hash the presented key and
/// compare against the stored digest.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extracts the prefix from a device key (first 8 characters after "bf_").
///
/// The prefix is safe to log and display; the full key never is.
pub fn extract_key_prefix(key: &str) -> Option<&str> {
    if key.starts_with("bf_") && key.len() >= 11 {
        Some(&key[3..11])
    } else {
        None
    }
}
