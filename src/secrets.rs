//! Secret material generated on first launch.
use bip39::Mnemonic;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{
    constants::{MNEMONIC_ENTROPY_BYTES, RANDOM_SECRET_BYTES},
    error::ConfigError,
};

/// Generates a checksummed 12-word BIP39 mnemonic.
pub fn generate_secret() -> Result<String, ConfigError> {
    let mut entropy = [0u8; MNEMONIC_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut entropy);
    let mnemonic =
        Mnemonic::from_entropy(&entropy).map_err(|err| ConfigError::Secret(err.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Returns whether `secret` is a valid BIP39 mnemonic (word list and checksum).
pub fn validate_secret(secret: &str) -> bool {
    let normalized = secret
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    Mnemonic::parse_normalized(&normalized).is_ok()
}

/// SHA-256 of the mnemonic, hex encoded. Stored next to the secret.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// `bytes` random bytes as a lowercase hex string.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// A 32-byte random hex secret for phoenixd passwords and webhooks.
pub fn random_secret() -> String {
    random_hex(RANDOM_SECRET_BYTES)
}
