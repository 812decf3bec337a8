//! Single-shot AES-256-GCM with a 128-bit IV
//!
//! Output format: `[N bytes: ciphertext][16 bytes: GCM tag]`, IV returned
//! separately. Byte-for-byte identical to driving [`crate::AeadWriter`] over
//! the same input, but nothing is released until the tag has been verified.

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, Aead, KeyInit, Payload},
    aes::Aes256,
    AesGcm,
};

use docseal_core::{DocsealError, DocsealResult};

use crate::{iv_array, key_array, random_iv, IV_SIZE, TAG_SIZE};

/// AES-256-GCM parameterised for 16-byte nonces.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Encrypt with a fresh random IV. Returns `(iv, ciphertext || tag)`.
pub fn encrypt_sym(plaintext: &[u8], key: &[u8]) -> DocsealResult<([u8; IV_SIZE], Vec<u8>)> {
    let iv = random_iv();
    let ciphertext = encrypt_sym_with_iv(plaintext, key, &iv, b"")?;
    Ok((iv, ciphertext))
}

/// Encrypt under a caller-chosen IV and associated data.
///
/// The caller must never reuse `iv` under the same `key`.
pub fn encrypt_sym_with_iv(
    plaintext: &[u8],
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> DocsealResult<Vec<u8>> {
    let key = key_array(key)?;
    let iv = iv_array(iv)?;
    let cipher = Aes256Gcm16::new(GenericArray::from_slice(&key));

    cipher
        .encrypt(
            GenericArray::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| DocsealError::key_material(format!("encryption failed: {e}")))
}

/// Decrypt `ciphertext || tag` produced by [`encrypt_sym`].
pub fn decrypt_sym(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> DocsealResult<Vec<u8>> {
    decrypt_sym_with_aad(ciphertext, key, iv, b"")
}

/// Decrypt and verify `ciphertext || tag` with associated data.
pub fn decrypt_sym_with_aad(
    ciphertext: &[u8],
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> DocsealResult<Vec<u8>> {
    let key = key_array(key)?;
    let iv = iv_array(iv)?;
    if ciphertext.len() < TAG_SIZE {
        return Err(DocsealError::Authentication(format!(
            "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
            ciphertext.len()
        )));
    }

    let cipher = Aes256Gcm16::new(GenericArray::from_slice(&key));
    cipher
        .decrypt(
            GenericArray::from_slice(&iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            DocsealError::Authentication("invalid tag: wrong key, wrong IV, or corrupted data".into())
        })
}
