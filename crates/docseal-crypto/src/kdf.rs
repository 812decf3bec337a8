//! Key derivation: master secret → per-document subkeys, key material → wrapping keys

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use docseal_core::config::MIN_SECRET_LENGTH;
use docseal_core::{DocsealError, DocsealResult};

use crate::secret::MASTER_SECRET_LENGTH;
use crate::KEY_SIZE;

type HmacSha256 = Hmac<Sha256>;

/// Leading bytes of a full-length master secret reserved for local storage.
/// Document subkeys are keyed with the remainder.
pub const LOCAL_STORAGE_SECRET_LENGTH: usize = 64;

/// Derive the AES-256 key for one document.
///
/// `HMAC-SHA256(key = remote part of master_secret, msg = doc_id)`. For a
/// 96-byte secret the HMAC key is bytes 64..96; shorter secrets are used whole.
/// An empty `doc_id` is allowed; a missing or sub-256-bit secret is not.
pub fn derive_doc_key(doc_id: &str, master_secret: &[u8]) -> DocsealResult<[u8; KEY_SIZE]> {
    let hmac_key = remote_storage_key(master_secret)?;
    let mut mac = HmacSha256::new_from_slice(hmac_key)
        .map_err(|e| DocsealError::key_material(format!("HMAC key setup failed: {e}")))?;
    mac.update(doc_id.as_bytes());
    Ok(mac.finalize().into_bytes().into())
}

fn remote_storage_key(master_secret: &[u8]) -> DocsealResult<&[u8]> {
    match master_secret.len() {
        0 => Err(DocsealError::key_material("master secret is empty")),
        n if n < MIN_SECRET_LENGTH => Err(DocsealError::key_material(format!(
            "master secret must be at least {MIN_SECRET_LENGTH} bytes, got {n}"
        ))),
        n if n >= MASTER_SECRET_LENGTH => Ok(&master_secret[LOCAL_STORAGE_SECRET_LENGTH..]),
        _ => Ok(master_secret),
    }
}

/// HKDF-SHA256 expansion of arbitrary key material with a domain-specific info string.
pub fn hkdf_derive(ikm: &[u8], info: &[u8]) -> DocsealResult<[u8; KEY_SIZE]> {
    if ikm.is_empty() {
        return Err(DocsealError::key_material("HKDF input key material is empty"));
    }
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| DocsealError::key_material(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}
