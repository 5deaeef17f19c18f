//! Shared-secret handling for the manager handshake.

use sha2::{Digest, Sha256};
use std::fmt;

/// Length of the nonce the manager sends in its challenge.
pub const NONCE_LEN: usize = 32;

/// Authentication key shared with the manager.
///
/// String secrets are stored as their UTF-8 bytes; byte secrets are kept
/// as-is. The key is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey(Vec<u8>);

impl AuthKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex form used to hand the key to worker processes through the environment.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(encoded).map(AuthKey)
    }
}

impl From<&str> for AuthKey {
    fn from(secret: &str) -> Self {
        AuthKey(secret.as_bytes().to_vec())
    }
}

impl From<String> for AuthKey {
    fn from(secret: String) -> Self {
        AuthKey(secret.into_bytes())
    }
}

impl From<&[u8]> for AuthKey {
    fn from(secret: &[u8]) -> Self {
        AuthKey(secret.to_vec())
    }
}

impl From<Vec<u8>> for AuthKey {
    fn from(secret: Vec<u8>) -> Self {
        AuthKey(secret)
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthKey(<redacted>)")
    }
}

/// Answer to a manager challenge: `SHA-256(nonce || key)`.
pub fn challenge_digest(nonce: &[u8], key: &AuthKey) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(key.as_bytes());
    hasher.finalize().to_vec()
}
