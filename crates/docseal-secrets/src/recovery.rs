//! Recovery documents: every master secret wrapped under one recovery key
//!
//! JSON shape:
//! ```text
//! { "<secret_id>": { "cipher": "aes_256_gcm" | "aes256",
//!                    "length": <secret length>,
//!                    "secret": "<b64 iv>:<b64 ciphertext[||tag]>" }, ... }
//! ```
//! `aes256` is the retired unauthenticated CTR wrapping. It is still readable
//! but carries no integrity protection.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::legacy::{decrypt_ctr, encrypt_ctr};
use docseal_crypto::{decrypt_sym, encrypt_sym, hkdf_derive, MasterSecret, SecretId, KEY_SIZE};

/// HKDF info string for recovery wrapping keys.
pub const RECOVERY_KDF_INFO: &[u8] = b"docseal-recovery";

/// Cipher used to wrap a secret inside a recovery record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryCipher {
    #[default]
    Aes256Gcm,
    /// AES-256-CTR without a tag.
    LegacyAes256,
}

impl RecoveryCipher {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes_256_gcm",
            Self::LegacyAes256 => "aes256",
        }
    }
}

impl FromStr for RecoveryCipher {
    type Err = DocsealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes_256_gcm" => Ok(Self::Aes256Gcm),
            "aes256" => Ok(Self::LegacyAes256),
            other => Err(DocsealError::UnsupportedRecoveryCipher(other.to_string())),
        }
    }
}

impl fmt::Display for RecoveryCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 256-bit key that wraps secrets in a recovery document.
pub struct RecoveryKey {
    key: [u8; KEY_SIZE],
}

impl RecoveryKey {
    /// Use `bytes` directly; must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> DocsealResult<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            DocsealError::key_material(format!(
                "recovery key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Expand arbitrary long-term key material with HKDF-SHA256.
    pub fn derive(material: &[u8]) -> DocsealResult<Self> {
        Ok(Self {
            key: hkdf_derive(material, RECOVERY_KDF_INFO)?,
        })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl Drop for RecoveryKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryKey([REDACTED])")
    }
}

/// One wrapped secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecretRecord {
    pub cipher: String,
    pub length: usize,
    pub secret: String,
}

impl EncryptedSecretRecord {
    pub fn seal(secret: &MasterSecret, key: &RecoveryKey, cipher: RecoveryCipher) -> DocsealResult<Self> {
        let (iv, ciphertext) = match cipher {
            RecoveryCipher::Aes256Gcm => encrypt_sym(secret.as_bytes(), key.as_bytes())?,
            RecoveryCipher::LegacyAes256 => encrypt_ctr(secret.as_bytes(), key.as_bytes())?,
        };
        Ok(Self {
            cipher: cipher.as_str().to_string(),
            length: secret.len(),
            secret: format!("{}:{}", STANDARD.encode(iv), STANDARD.encode(ciphertext)),
        })
    }

    /// Unwrap by the record's declared cipher and check the declared length.
    pub fn open(&self, key: &RecoveryKey) -> DocsealResult<MasterSecret> {
        let cipher: RecoveryCipher = self.cipher.parse()?;
        let (iv, ciphertext) = self
            .secret
            .split_once(':')
            .ok_or_else(|| DocsealError::malformed("recovery record secret is not <iv>:<ciphertext>"))?;
        let iv = STANDARD.decode(iv)?;
        let ciphertext = STANDARD.decode(ciphertext)?;

        let mut bytes = match cipher {
            RecoveryCipher::Aes256Gcm => decrypt_sym(&ciphertext, key.as_bytes(), &iv)?,
            RecoveryCipher::LegacyAes256 => decrypt_ctr(&ciphertext, key.as_bytes(), &iv)?,
        };
        if bytes.len() != self.length {
            let got = bytes.len();
            bytes.zeroize();
            return Err(DocsealError::key_material(format!(
                "recovered secret is {got} bytes, record declares {}",
                self.length
            )));
        }
        MasterSecret::from_bytes(bytes)
    }
}

/// Secret id → wrapped secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveryDocument {
    records: BTreeMap<SecretId, EncryptedSecretRecord>,
}

impl RecoveryDocument {
    /// Wrap every `(id, secret)` pair under `key`.
    pub fn seal<'a, I>(secrets: I, key: &RecoveryKey, cipher: RecoveryCipher) -> DocsealResult<Self>
    where
        I: IntoIterator<Item = (&'a SecretId, &'a MasterSecret)>,
    {
        let mut records = BTreeMap::new();
        for (id, secret) in secrets {
            records.insert(id.clone(), EncryptedSecretRecord::seal(secret, key, cipher)?);
        }
        Ok(Self { records })
    }

    /// Unwrap every record. Fails as a whole on the first bad record.
    ///
    /// Each unwrapped secret must hash to the id it is filed under. Legacy
    /// `aes256` records carry no tag, so this is the only check that catches
    /// a wrong recovery key for them.
    pub fn open(&self, key: &RecoveryKey) -> DocsealResult<Vec<(SecretId, MasterSecret)>> {
        let mut opened = Vec::with_capacity(self.records.len());
        for (declared, record) in &self.records {
            let secret = record.open(key)?;
            let id = secret.id();
            if &id != declared {
                return Err(DocsealError::Authentication(format!(
                    "recovery record {declared} unwrapped to a secret with id {id}"
                )));
            }
            opened.push((id, secret));
        }
        Ok(opened)
    }

    pub fn get(&self, id: &SecretId) -> Option<&EncryptedSecretRecord> {
        self.records.get(id)
    }

    pub fn insert(&mut self, id: SecretId, record: EncryptedSecretRecord) {
        self.records.insert(id, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn from_json(json: &str) -> DocsealResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> DocsealResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
