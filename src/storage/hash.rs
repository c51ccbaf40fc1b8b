use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `input`.
pub fn compute_hash(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}
