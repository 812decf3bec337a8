//! Master secrets and their content-derived identifiers

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use docseal_core::config::MIN_SECRET_LENGTH;
use docseal_core::{DocsealError, DocsealResult};

/// Length of freshly generated master secrets (768-bit).
pub const MASTER_SECRET_LENGTH: usize = 96;

/// Hex-encoded SHA-256 of a master secret's bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    pub fn of(secret: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(secret)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecretId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SecretId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Long-lived key material from which every document subkey is derived.
///
/// Immutable once created. Zeroized on drop.
#[derive(Clone)]
pub struct MasterSecret {
    bytes: Vec<u8>,
}

impl MasterSecret {
    /// Wrap existing secret bytes. Rejects anything shorter than 256 bits.
    pub fn from_bytes(bytes: Vec<u8>) -> DocsealResult<Self> {
        if bytes.len() < MIN_SECRET_LENGTH {
            let len = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(DocsealError::key_material(format!(
                "master secret must be at least {MIN_SECRET_LENGTH} bytes, got {len}"
            )));
        }
        Ok(Self { bytes })
    }

    /// Generate `length` bytes from the thread-local CSPRNG.
    pub fn generate(length: usize) -> DocsealResult<Self> {
        let mut bytes = vec![0u8; length];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn id(&self) -> SecretId {
        SecretId::of(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for MasterSecret {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.bytes.as_slice().ct_eq(other.bytes.as_slice()).into()
    }
}

impl Eq for MasterSecret {}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("id", &self.id())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
