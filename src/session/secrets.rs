//! Opaque refresh secrets.
//!
//! The raw secret leaves the server exactly once, in a cookie; only its
//! SHA-256 digest is persisted and used for lookups.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Bytes of randomness in a refresh secret (hex-encoded to twice as many chars).
pub const REFRESH_SECRET_BYTES: usize = 32;

/// Generate a new random refresh secret.
pub fn generate_refresh_secret() -> String {
    let mut buf = [0u8; REFRESH_SECRET_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// One-way digest stored in place of the raw secret.
pub fn hash_refresh_secret(secret: &str) -> String {
    let mut h = Sha256::new();
    h.update(secret.as_bytes());
    hex::encode(h.finalize())
}
