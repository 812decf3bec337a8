//! Retired AES-256-CTR cipher (no authentication)
//!
//! Kept only so that material written by older clients (recovery documents
//! tagged `aes256`, blobs tagged `aes_256_ctr`) can still be read. Nothing here
//! detects tampering. Every decrypt logs a warning.

use aes::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use aes::Aes256;

use docseal_core::DocsealResult;

use crate::{iv_array, key_array, random_iv, IV_SIZE};

/// Full 128-bit big-endian counter, initialised from the IV.
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

fn apply(data: &[u8], key: &[u8], iv: &[u8]) -> DocsealResult<Vec<u8>> {
    let key = key_array(key)?;
    let iv = iv_array(iv)?;
    let mut cipher = Aes256Ctr::new(GenericArray::from_slice(&key), GenericArray::from_slice(&iv));
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    Ok(out)
}

/// Encrypt with a random IV. Returns `(iv, ciphertext)`; there is no tag.
pub fn encrypt_ctr(plaintext: &[u8], key: &[u8]) -> DocsealResult<([u8; IV_SIZE], Vec<u8>)> {
    let iv = random_iv();
    let ciphertext = apply(plaintext, key, &iv)?;
    Ok((iv, ciphertext))
}

/// Decrypt CTR ciphertext. Any ciphertext decrypts to *something*.
pub fn decrypt_ctr(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> DocsealResult<Vec<u8>> {
    tracing::warn!(
        bytes = ciphertext.len(),
        "decrypting with legacy unauthenticated AES-256-CTR"
    );
    apply(ciphertext, key, iv)
}
