//! Chunked AES-256-GCM over an `io::Write` sink
//!
//! GCM is CTR mode plus GHASH, both of which can absorb input incrementally,
//! so the writer never needs the whole message in memory. Input is buffered
//! into `chunk_size` pieces (default 4096 bytes), each piece is transformed and
//! pushed to the sink, and `end()` produces or checks the single tag that
//! covers the associated data and the entire stream.
//!
//! Counter derivation for the 128-bit IV follows NIST SP 800-38D:
//! ```text
//! H  = AES_K(0^128)
//! J0 = GHASH_H(IV || 0^64 || [128]_64)
//! C  = CTR_K(inc32(J0), P)
//! T  = GHASH_H(A || C || [len(A)]_64 || [len(C)]_64) XOR AES_K(J0)
//! ```
//!
//! Decryption streams plaintext to the sink before the tag is known unless the
//! writer is switched to [`AeadWriter::verified`]. A streaming decrypt that
//! fails in `end()` has already released unauthenticated plaintext; callers of
//! that mode must discard whatever the sink received.

use std::io::Write;

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes256;
use ghash::{universal_hash::UniversalHash, GHash};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use docseal_core::{DocsealError, DocsealResult};

use crate::{iv_array, key_array, random_iv, DEFAULT_CHUNK_SIZE, IV_SIZE, TAG_SIZE};

type Aes256Ctr32 = ctr::Ctr32BE<Aes256>;

/// GCM's per-invocation plaintext ceiling: 2^32 - 2 blocks.
const MAX_STREAM_LEN: u64 = ((1u64 << 32) - 2) * 16;

const BLOCK: usize = 16;

enum Mode {
    Encrypt,
    Decrypt {
        expected_tag: [u8; TAG_SIZE],
        /// Plaintext held back until the tag verifies (None = stream through).
        held: Option<Vec<u8>>,
    },
}

/// Incremental GHASH that pads only at segment boundaries.
struct GhashState {
    ghash: GHash,
    pending: Vec<u8>,
}

impl GhashState {
    fn absorb(&mut self, mut data: &[u8]) {
        if !self.pending.is_empty() {
            let take = (BLOCK - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() < BLOCK {
                return;
            }
            self.ghash.update_padded(&self.pending);
            self.pending.clear();
        }
        let full = data.len() - data.len() % BLOCK;
        self.ghash.update_padded(&data[..full]);
        self.pending.extend_from_slice(&data[full..]);
    }

    /// Close the current segment, zero-padding a trailing partial block.
    fn pad(&mut self) {
        if !self.pending.is_empty() {
            self.ghash.update_padded(&self.pending);
            self.pending.clear();
        }
    }
}

/// Streaming AES-256-GCM encryptor/decryptor writing into `W`.
///
/// Construct with [`AeadWriter::encrypt`] or [`AeadWriter::decrypt`], optionally
/// attach associated data with [`AeadWriter::with_aad`], feed bytes with
/// [`AeadWriter::write`] any number of times, then call [`AeadWriter::end`].
pub struct AeadWriter<W: Write> {
    sink: W,
    iv: [u8; IV_SIZE],
    ctr: Aes256Ctr32,
    ghash: GhashState,
    tag_mask: [u8; TAG_SIZE],
    mode: Mode,
    chunk_size: usize,
    buffer: Vec<u8>,
    aad_len: u64,
    payload_len: u64,
}

impl<W: Write> AeadWriter<W> {
    /// Open an encrypting writer. Without `iv`, a fresh random IV is generated
    /// and is available from [`AeadWriter::iv`] before anything is written.
    pub fn encrypt(key: &[u8], iv: Option<&[u8]>, sink: W) -> DocsealResult<Self> {
        let iv = match iv {
            Some(iv) => iv_array(iv)?,
            None => random_iv(),
        };
        Self::open(key, iv, sink, Mode::Encrypt)
    }

    /// Open a decrypting writer: bytes written are ciphertext, the sink
    /// receives plaintext, and `end()` checks `tag`.
    pub fn decrypt(key: &[u8], iv: &[u8], sink: W, tag: &[u8]) -> DocsealResult<Self> {
        let iv = iv_array(iv)?;
        let expected_tag: [u8; TAG_SIZE] = tag.try_into().map_err(|_| {
            DocsealError::key_material(format!("tag must be {TAG_SIZE} bytes, got {}", tag.len()))
        })?;
        Self::open(
            key,
            iv,
            sink,
            Mode::Decrypt {
                expected_tag,
                held: None,
            },
        )
    }

    fn open(key: &[u8], iv: [u8; IV_SIZE], sink: W, mode: Mode) -> DocsealResult<Self> {
        let mut key = key_array(key)?;
        let cipher = Aes256::new(GenericArray::from_slice(&key));

        let mut h = ghash::Block::default();
        cipher.encrypt_block(&mut h);

        let mut j0_hash = GHash::new(&h);
        j0_hash.update_padded(&iv);
        let mut len_block = ghash::Block::default();
        len_block[8..].copy_from_slice(&((IV_SIZE as u64) * 8).to_be_bytes());
        j0_hash.update(&[len_block]);
        let j0 = j0_hash.finalize();

        let mut tag_mask = j0;
        cipher.encrypt_block(&mut tag_mask);

        let mut counter = j0;
        inc32(&mut counter);
        let ctr = Aes256Ctr32::new(GenericArray::from_slice(&key), &counter);
        key.zeroize();

        Ok(Self {
            sink,
            iv,
            ctr,
            ghash: GhashState {
                ghash: GHash::new(&h),
                pending: Vec::with_capacity(BLOCK),
            },
            tag_mask: tag_mask.into(),
            mode,
            chunk_size: DEFAULT_CHUNK_SIZE,
            buffer: Vec::with_capacity(DEFAULT_CHUNK_SIZE),
            aad_len: 0,
            payload_len: 0,
        })
    }

    /// Authenticate `aad` ahead of the payload. Must precede any `write`.
    pub fn with_aad(mut self, aad: &[u8]) -> DocsealResult<Self> {
        if self.payload_len > 0 || !self.buffer.is_empty() {
            return Err(DocsealError::key_material(
                "associated data must be supplied before the payload",
            ));
        }
        self.ghash.absorb(aad);
        self.aad_len += aad.len() as u64;
        Ok(self)
    }

    /// Set the buffering chunk size. Values below one AES block are raised to 16.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(BLOCK).max(self.buffer.len());
        self.buffer.reserve(self.chunk_size - self.buffer.len());
        self
    }

    /// Decrypt mode only: hold all plaintext until `end()` has verified the tag.
    pub fn verified(mut self) -> Self {
        if let Mode::Decrypt { held, .. } = &mut self.mode {
            *held = Some(Vec::new());
        }
        self
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Feed input of any length.
    pub fn write(&mut self, mut data: &[u8]) -> DocsealResult<()> {
        while !data.is_empty() {
            let take = (self.chunk_size - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == self.chunk_size {
                self.flush_chunk()?;
            }
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> DocsealResult<()> {
        let mut chunk = std::mem::take(&mut self.buffer);
        let len = chunk.len() as u64;
        if self.payload_len + len > MAX_STREAM_LEN {
            chunk.zeroize();
            return Err(DocsealError::key_material(
                "stream exceeds the GCM length limit for a single IV",
            ));
        }
        if self.payload_len == 0 && self.aad_len > 0 {
            self.ghash.pad();
        }

        match &mut self.mode {
            Mode::Encrypt => {
                self.ctr.apply_keystream(&mut chunk);
                self.ghash.absorb(&chunk);
                self.sink.write_all(&chunk)?;
            }
            Mode::Decrypt { held, .. } => {
                self.ghash.absorb(&chunk);
                self.ctr.apply_keystream(&mut chunk);
                match held {
                    Some(held) => held.extend_from_slice(&chunk),
                    None => self.sink.write_all(&chunk)?,
                }
            }
        }
        self.payload_len += len;

        chunk.zeroize();
        chunk.clear();
        self.buffer = chunk;
        Ok(())
    }

    /// Flush buffered input and finish the GCM computation.
    ///
    /// Encrypt mode: returns the tag. Decrypt mode: returns the verified tag,
    /// or `Authentication` on mismatch, in which case nothing further reaches
    /// the sink.
    pub fn end(mut self) -> DocsealResult<[u8; TAG_SIZE]> {
        if !self.buffer.is_empty() {
            self.flush_chunk()?;
        }
        let tag = self.compute_tag();

        match std::mem::replace(&mut self.mode, Mode::Encrypt) {
            Mode::Encrypt => {
                self.sink.flush()?;
                Ok(tag)
            }
            Mode::Decrypt {
                expected_tag,
                held,
            } => {
                if !bool::from(tag[..].ct_eq(&expected_tag[..])) {
                    if let Some(mut held) = held {
                        held.zeroize();
                    }
                    tracing::debug!(bytes = self.payload_len, "GCM tag mismatch");
                    return Err(DocsealError::Authentication(
                        "invalid tag: wrong key, wrong IV, or corrupted data".into(),
                    ));
                }
                if let Some(mut held) = held {
                    self.sink.write_all(&held)?;
                    held.zeroize();
                }
                self.sink.flush()?;
                Ok(tag)
            }
        }
    }

    fn compute_tag(&mut self) -> [u8; TAG_SIZE] {
        self.ghash.pad();
        let mut len_block = ghash::Block::default();
        len_block[..8].copy_from_slice(&(self.aad_len * 8).to_be_bytes());
        len_block[8..].copy_from_slice(&(self.payload_len * 8).to_be_bytes());
        self.ghash.ghash.update(&[len_block]);

        let s = self.ghash.ghash.clone().finalize();
        let mut tag = [0u8; TAG_SIZE];
        for (i, byte) in tag.iter_mut().enumerate() {
            *byte = s[i] ^ self.tag_mask[i];
        }
        tag
    }
}

/// Increment the low 32 bits of a counter block, big-endian, wrapping.
fn inc32(block: &mut ghash::Block) {
    let mut ctr = [0u8; 4];
    ctr.copy_from_slice(&block[12..]);
    let next = u32::from_be_bytes(ctr).wrapping_add(1);
    block[12..].copy_from_slice(&next.to_be_bytes());
}
