//! Random secrets and their one-way digests.
//!
//! Session and refresh secrets are opaque random strings handed to the client
//! exactly once. Only [`hash_token`] of a secret is ever written to storage.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Number of random bytes in every generated secret.
pub const SECRET_BYTES: usize = 32;

/// Generate a new secret from the operating system RNG, base64url encoded.
pub fn generate_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 hex digest of a secret, used as its storage key.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
