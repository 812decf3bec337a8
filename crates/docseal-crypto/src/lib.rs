//! docseal-crypto: document and blob encryption for docseal
//!
//! Architecture: per-document subkey + AES-256-GCM with a 128-bit IV
//!
//! Pipeline: master secret → HMAC-SHA256(doc_id) subkey → header as AAD → chunked GCM → blob
//!
//! Blob layout:
//! ```text
//! magic(4) | scheme(1) | method(1) | timestamp(4, BE) | iv(16) | doc_id(256) | doc_rev(256)
//!   | ciphertext(N) | tag(16)
//! ```
//!
//! The header is authenticated but not encrypted, so tampering with any header
//! field (including the document identity) invalidates the tag.

pub mod aead;
pub mod blob;
pub mod envelope;
pub mod kdf;
pub mod legacy;
pub mod secret;
pub mod stream;
pub mod task;

pub use aead::{decrypt_sym, decrypt_sym_with_aad, encrypt_sym, encrypt_sym_with_iv};
pub use blob::{BlobDecryptor, BlobEncryptor, BlobHeader, EncryptedBlob, EncryptionMethod};
pub use envelope::{decrypt_doc, decrypt_doc_with, encrypt_doc, is_encrypted, EncryptedDocument};
pub use kdf::{derive_doc_key, hkdf_derive};
pub use secret::{MasterSecret, SecretId};
pub use stream::AeadWriter;
pub use task::{decrypt_blob_task, encrypt_blob_task};

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// GCM IV size used throughout docseal (128-bit, not the 96-bit GCM default)
pub const IV_SIZE: usize = 16;

/// GCM authentication tag size
pub const TAG_SIZE: usize = 16;

/// Default buffering chunk for the streaming engine
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Check a key slice and copy it into a fixed-size array.
pub(crate) fn key_array(key: &[u8]) -> docseal_core::DocsealResult<[u8; KEY_SIZE]> {
    key.try_into().map_err(|_| {
        docseal_core::DocsealError::key_material(format!(
            "key must be {KEY_SIZE} bytes, got {}",
            key.len()
        ))
    })
}

/// Check an IV slice and copy it into a fixed-size array.
pub(crate) fn iv_array(iv: &[u8]) -> docseal_core::DocsealResult<[u8; IV_SIZE]> {
    iv.try_into().map_err(|_| {
        docseal_core::DocsealError::key_material(format!(
            "IV must be {IV_SIZE} bytes, got {}",
            iv.len()
        ))
    })
}

/// Fresh random IV from the thread-local CSPRNG.
pub(crate) fn random_iv() -> [u8; IV_SIZE] {
    use rand::RngCore;
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}
