//! Blob envelope: authenticated header + AES-256-GCM ciphertext + tag
//!
//! Header format (binary, big-endian, 538 bytes):
//! ```text
//! [4 bytes: magic 13 37 d0 c5]
//! [1 byte : scheme version = 1]
//! [1 byte : encryption method (1 = aes_256_ctr, retired; 2 = aes_256_gcm)]
//! [4 bytes: timestamp, unix seconds]
//! [16 bytes: IV]
//! [256 bytes: doc_id  = 1-byte length + 255 bytes zero padded]
//! [256 bytes: doc_rev = 1-byte length + 255 bytes zero padded]
//! ```
//! followed by `[N bytes: ciphertext][16 bytes: tag]`. The whole header is the
//! GCM associated data and the subkey is derived from `doc_id`, so a blob can
//! only be opened as the document and revision it was sealed for.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use docseal_core::{DocsealError, DocsealResult};

use crate::kdf::derive_doc_key;
use crate::legacy::decrypt_ctr;
use crate::secret::MasterSecret;
use crate::stream::AeadWriter;
use crate::{random_iv, DEFAULT_CHUNK_SIZE, IV_SIZE, TAG_SIZE};

pub const BLOB_MAGIC: [u8; 4] = [0x13, 0x37, 0xd0, 0xc5];

pub const SCHEME_VERSION: u8 = 1;

/// Maximum UTF-8 length of `doc_id` and `doc_rev`.
pub const MAX_FIELD_LEN: usize = 255;

const FIELD_WIDTH: usize = 1 + MAX_FIELD_LEN;

pub const HEADER_SIZE: usize = 4 + 1 + 1 + 4 + IV_SIZE + FIELD_WIDTH * 2;

/// Cipher construction recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EncryptionMethod {
    /// Retired unauthenticated CTR mode, recognised for decryption only.
    Aes256Ctr = 1,
    Aes256Gcm = 2,
}

impl EncryptionMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Aes256Ctr),
            2 => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256Ctr => "aes_256_ctr",
            Self::Aes256Gcm => "aes_256_gcm",
        }
    }
}

/// Parsed blob header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub scheme_version: u8,
    pub method: EncryptionMethod,
    pub timestamp: u32,
    pub iv: [u8; IV_SIZE],
    pub doc_id: String,
    pub doc_rev: String,
}

impl BlobHeader {
    /// Header for a new AES-256-GCM blob stamped with the current time.
    pub fn new(doc_id: &str, doc_rev: &str, iv: [u8; IV_SIZE]) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        Self {
            scheme_version: SCHEME_VERSION,
            method: EncryptionMethod::Aes256Gcm,
            timestamp,
            iv,
            doc_id: doc_id.to_string(),
            doc_rev: doc_rev.to_string(),
        }
    }

    /// Serialize to the fixed-width wire layout.
    pub fn to_bytes(&self) -> DocsealResult<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&BLOB_MAGIC);
        out.push(self.scheme_version);
        out.push(self.method as u8);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.iv);
        put_field(&mut out, "doc_id", &self.doc_id)?;
        put_field(&mut out, "doc_rev", &self.doc_rev)?;
        debug_assert_eq!(out.len(), HEADER_SIZE);
        Ok(out)
    }

    /// Parse the first `HEADER_SIZE` bytes of `data`.
    pub fn parse(data: &[u8]) -> DocsealResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(DocsealError::malformed(format!(
                "blob too short for header: {} bytes (need {HEADER_SIZE})",
                data.len()
            )));
        }
        if !Self::sniff(data) {
            return Err(DocsealError::malformed("bad magic"));
        }
        let scheme_version = data[4];
        if scheme_version != SCHEME_VERSION {
            return Err(DocsealError::malformed(format!(
                "unsupported scheme version {scheme_version}"
            )));
        }
        let method = EncryptionMethod::from_u8(data[5]).ok_or_else(|| {
            DocsealError::malformed(format!("unknown encryption method {}", data[5]))
        })?;

        let mut ts = [0u8; 4];
        ts.copy_from_slice(&data[6..10]);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&data[10..10 + IV_SIZE]);

        let ids = 10 + IV_SIZE;
        let doc_id = get_field(&data[ids..ids + FIELD_WIDTH], "doc_id")?;
        let doc_rev = get_field(&data[ids + FIELD_WIDTH..HEADER_SIZE], "doc_rev")?;

        Ok(Self {
            scheme_version,
            method,
            timestamp: u32::from_be_bytes(ts),
            iv,
            doc_id,
            doc_rev,
        })
    }

    /// Magic check only. Does not validate anything else.
    pub fn sniff(data: &[u8]) -> bool {
        data.len() >= BLOB_MAGIC.len() && data[..BLOB_MAGIC.len()] == BLOB_MAGIC
    }
}

fn put_field(out: &mut Vec<u8>, field: &'static str, value: &str) -> DocsealResult<()> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_FIELD_LEN {
        return Err(DocsealError::FieldTooLong {
            field,
            max: MAX_FIELD_LEN,
            got: bytes.len(),
        });
    }
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    out.resize(out.len() + MAX_FIELD_LEN - bytes.len(), 0);
    Ok(())
}

fn get_field(raw: &[u8], field: &'static str) -> DocsealResult<String> {
    let len = raw[0] as usize;
    String::from_utf8(raw[1..1 + len].to_vec())
        .map_err(|_| DocsealError::malformed(format!("{field} is not UTF-8")))
}

/// Summary of a finished encryption.
#[derive(Debug, Clone)]
pub struct EncryptedBlob {
    pub header: BlobHeader,
    pub tag: [u8; TAG_SIZE],
    /// Total bytes written to the sink (header + ciphertext + tag).
    pub len: u64,
}

/// Seals one document revision into a blob.
pub struct BlobEncryptor<'a> {
    doc_id: &'a str,
    doc_rev: &'a str,
    secret: &'a MasterSecret,
    chunk_size: usize,
}

impl<'a> BlobEncryptor<'a> {
    pub fn new(doc_id: &'a str, doc_rev: &'a str, secret: &'a MasterSecret) -> Self {
        Self {
            doc_id,
            doc_rev,
            secret,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Stream `source` into `sink` as `header || ciphertext || tag`.
    pub fn encrypt<R: Read, W: Write>(&self, mut source: R, mut sink: W) -> DocsealResult<EncryptedBlob> {
        let key = derive_doc_key(self.doc_id, self.secret.as_bytes())?;
        let header = BlobHeader::new(self.doc_id, self.doc_rev, random_iv());
        let header_bytes = header.to_bytes()?;
        sink.write_all(&header_bytes)?;

        let mut writer = AeadWriter::encrypt(&key, Some(&header.iv[..]), &mut sink)?
            .with_chunk_size(self.chunk_size)
            .with_aad(&header_bytes)?;

        let mut buf = vec![0u8; self.chunk_size.max(1)];
        let mut ciphertext_len = 0u64;
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            writer.write(&buf[..n])?;
            ciphertext_len += n as u64;
        }
        let tag = writer.end()?;
        sink.write_all(&tag)?;
        sink.flush()?;

        tracing::debug!(
            doc_id = self.doc_id,
            doc_rev = self.doc_rev,
            bytes = ciphertext_len,
            "sealed blob"
        );

        Ok(EncryptedBlob {
            header,
            tag,
            len: HEADER_SIZE as u64 + ciphertext_len + TAG_SIZE as u64,
        })
    }

    pub fn encrypt_to_vec<R: Read>(&self, source: R) -> DocsealResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encrypt(source, &mut out)?;
        Ok(out)
    }
}

/// Opens a blob for an expected document revision.
pub struct BlobDecryptor<'a> {
    doc_id: &'a str,
    doc_rev: &'a str,
    secret: &'a MasterSecret,
    chunk_size: usize,
    accept_legacy: bool,
}

impl<'a> BlobDecryptor<'a> {
    pub fn new(doc_id: &'a str, doc_rev: &'a str, secret: &'a MasterSecret) -> Self {
        Self {
            doc_id,
            doc_rev,
            secret,
            chunk_size: DEFAULT_CHUNK_SIZE,
            accept_legacy: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Allow blobs written with the retired, unauthenticated CTR method.
    pub fn accept_legacy(mut self, accept: bool) -> Self {
        self.accept_legacy = accept;
        self
    }

    /// Verify and decrypt `blob` into `sink`. Plaintext reaches the sink only
    /// after the tag has verified. Returns the plaintext length.
    pub fn decrypt_to<W: Write>(&self, blob: &[u8], mut sink: W) -> DocsealResult<u64> {
        let header = BlobHeader::parse(blob)?;

        if header.doc_id != self.doc_id {
            return Err(DocsealError::DocumentMismatch {
                field: "doc_id",
                expected: self.doc_id.to_string(),
                found: header.doc_id,
            });
        }
        if header.doc_rev != self.doc_rev {
            return Err(DocsealError::DocumentMismatch {
                field: "doc_rev",
                expected: self.doc_rev.to_string(),
                found: header.doc_rev,
            });
        }

        let key = derive_doc_key(self.doc_id, self.secret.as_bytes())?;
        let (header_bytes, body) = blob.split_at(HEADER_SIZE);

        match header.method {
            EncryptionMethod::Aes256Gcm => {
                if body.len() < TAG_SIZE {
                    return Err(DocsealError::malformed(format!(
                        "blob body too short for tag: {} bytes",
                        body.len()
                    )));
                }
                let (ciphertext, tag) = body.split_at(body.len() - TAG_SIZE);
                let mut writer = AeadWriter::decrypt(&key, &header.iv, &mut sink, tag)?
                    .with_chunk_size(self.chunk_size)
                    .with_aad(header_bytes)?
                    .verified();
                for chunk in ciphertext.chunks(self.chunk_size.max(1)) {
                    writer.write(chunk)?;
                }
                writer.end()?;
                tracing::debug!(
                    doc_id = self.doc_id,
                    method = header.method.as_str(),
                    bytes = ciphertext.len(),
                    "opened blob"
                );
                Ok(ciphertext.len() as u64)
            }
            EncryptionMethod::Aes256Ctr => {
                if !self.accept_legacy {
                    return Err(DocsealError::malformed(format!(
                        "blob uses retired method {} and legacy blobs are not accepted",
                        header.method.as_str()
                    )));
                }
                let plaintext = decrypt_ctr(body, &key, &header.iv)?;
                sink.write_all(&plaintext)?;
                tracing::warn!(
                    doc_id = self.doc_id,
                    method = header.method.as_str(),
                    "opened unauthenticated legacy blob"
                );
                Ok(plaintext.len() as u64)
            }
        }
    }

    pub fn decrypt(&self, blob: &[u8]) -> DocsealResult<Vec<u8>> {
        let mut out = Vec::new();
        self.decrypt_to(blob, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::MASTER_SECRET_LENGTH;

    fn secret() -> MasterSecret {
        MasterSecret::from_bytes(vec![b'A'; MASTER_SECRET_LENGTH]).unwrap()
    }

    fn seal(data: &[u8], doc_id: &str, rev: &str) -> Vec<u8> {
        let secret = secret();
        BlobEncryptor::new(doc_id, rev, &secret)
            .encrypt_to_vec(data)
            .unwrap()
    }

    #[test]
    fn test_header_layout() {
        let header = BlobHeader::new("D-1", "1:abc", [7u8; IV_SIZE]);
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(HEADER_SIZE, 538);
        assert_eq!(&bytes[..4], &BLOB_MAGIC);
        assert_eq!(bytes[4], SCHEME_VERSION);
        assert_eq!(bytes[5], EncryptionMethod::Aes256Gcm as u8);
        assert_eq!(EncryptionMethod::from_u8(bytes[5]).unwrap().as_str(), "aes_256_gcm");
        assert_eq!(EncryptionMethod::Aes256Ctr.as_str(), "aes_256_ctr");
        assert_eq!(&bytes[10..26], &[7u8; IV_SIZE]);
        assert_eq!(bytes[26], 3);
        assert_eq!(&bytes[27..30], b"D-1");
        assert!(bytes[30..282].iter().all(|&b| b == 0));
        assert_eq!(bytes[282], 5);
        assert_eq!(&bytes[283..288], b"1:abc");

        assert_eq!(BlobHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_field_limits() {
        let max = "x".repeat(MAX_FIELD_LEN);
        let header = BlobHeader::new(&max, "", [0u8; IV_SIZE]);
        let parsed = BlobHeader::parse(&header.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.doc_id, max);
        assert_eq!(parsed.doc_rev, "");

        let too_long = "x".repeat(MAX_FIELD_LEN + 1);
        let header = BlobHeader::new("D-1", &too_long, [0u8; IV_SIZE]);
        assert!(matches!(
            header.to_bytes(),
            Err(DocsealError::FieldTooLong { field: "doc_rev", max: 255, got: 256 })
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            BlobHeader::parse(&[0u8; 10]),
            Err(DocsealError::MalformedBlob(_))
        ));
        assert!(matches!(
            BlobHeader::parse(&[0u8; HEADER_SIZE]),
            Err(DocsealError::MalformedBlob(_))
        ));

        let mut bytes = BlobHeader::new("D-1", "1", [0u8; IV_SIZE]).to_bytes().unwrap();
        bytes[4] = 9;
        assert!(BlobHeader::parse(&bytes).is_err());
        bytes[4] = SCHEME_VERSION;
        bytes[5] = 0;
        assert!(BlobHeader::parse(&bytes).is_err());
        bytes[5] = 2;
        bytes[27] = 0xff;
        assert!(matches!(
            BlobHeader::parse(&bytes),
            Err(DocsealError::MalformedBlob(_))
        ));
    }

    #[test]
    fn test_roundtrip_hello_world() {
        let blob = seal(b"hello world", "D-1", "1:abc");
        assert_eq!(blob.len(), HEADER_SIZE + 11 + TAG_SIZE);

        let secret = secret();
        let plaintext = BlobDecryptor::new("D-1", "1:abc", &secret).decrypt(&blob).unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn test_encrypted_blob_summary() {
        let secret = secret();
        let mut out = Vec::new();
        let summary = BlobEncryptor::new("D-1", "1:abc", &secret)
            .encrypt(&b"hello world"[..], &mut out)
            .unwrap();
        assert_eq!(summary.len, out.len() as u64);
        assert_eq!(&out[out.len() - TAG_SIZE..], &summary.tag);
        assert_eq!(summary.header, BlobHeader::parse(&out).unwrap());
    }

    #[test]
    fn test_empty_payload() {
        let blob = seal(b"", "D-1", "1:abc");
        assert_eq!(blob.len(), HEADER_SIZE + TAG_SIZE);
        let secret = secret();
        assert!(BlobDecryptor::new("D-1", "1:abc", &secret)
            .decrypt(&blob)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_wrong_revision_is_mismatch() {
        let blob = seal(b"hello world", "D-1", "1:abc");
        let secret = secret();
        let err = BlobDecryptor::new("D-1", "1:xyz", &secret).decrypt(&blob).unwrap_err();
        assert!(matches!(err, DocsealError::DocumentMismatch { field: "doc_rev", .. }));

        let err = BlobDecryptor::new("D-2", "1:abc", &secret).decrypt(&blob).unwrap_err();
        assert!(matches!(err, DocsealError::DocumentMismatch { field: "doc_id", .. }));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let mut blob = seal(b"hello world", "D-1", "1:abc");
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let secret = secret();
        let mut out = Vec::new();
        let err = BlobDecryptor::new("D-1", "1:abc", &secret)
            .decrypt_to(&blob, &mut out)
            .unwrap_err();
        assert!(matches!(err, DocsealError::Authentication(_)));
        assert!(out.is_empty(), "no plaintext may be released on failure");
    }

    #[test]
    fn test_tampered_header_fails() {
        let mut blob = seal(b"hello world", "D-1", "1:abc");
        // timestamp is not checked by parse, only by the tag
        blob[9] ^= 0x01;
        let secret = secret();
        let err = BlobDecryptor::new("D-1", "1:abc", &secret).decrypt(&blob).unwrap_err();
        assert!(matches!(err, DocsealError::Authentication(_)));
    }

    #[test]
    fn test_tampered_iv_fails() {
        let mut blob = seal(b"hello world", "D-1", "1:abc");
        blob[10] ^= 0x01;
        let secret = secret();
        let mut out = Vec::new();
        let err = BlobDecryptor::new("D-1", "1:abc", &secret)
            .decrypt_to(&blob, &mut out)
            .unwrap_err();
        assert!(matches!(err, DocsealError::Authentication(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let blob = seal(b"hello world", "D-1", "1:abc");
        let other = MasterSecret::from_bytes(vec![b'B'; MASTER_SECRET_LENGTH]).unwrap();
        let err = BlobDecryptor::new("D-1", "1:abc", &other).decrypt(&blob).unwrap_err();
        assert!(matches!(err, DocsealError::Authentication(_)));
    }

    #[test]
    fn test_truncated_body_is_malformed() {
        let blob = seal(b"hello world", "D-1", "1:abc");
        let secret = secret();
        let err = BlobDecryptor::new("D-1", "1:abc", &secret)
            .decrypt(&blob[..HEADER_SIZE + 4])
            .unwrap_err();
        assert!(matches!(err, DocsealError::MalformedBlob(_)));
    }

    #[test]
    fn test_chunk_sizes_interoperate() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let secret = secret();
        for enc_chunk in [16, 100, 4096, 65536] {
            let blob = BlobEncryptor::new("D-big", "3-x", &secret)
                .with_chunk_size(enc_chunk)
                .encrypt_to_vec(data.as_slice())
                .unwrap();
            for dec_chunk in [16, 333, 4096] {
                let out = BlobDecryptor::new("D-big", "3-x", &secret)
                    .with_chunk_size(dec_chunk)
                    .decrypt(&blob)
                    .unwrap();
                assert_eq!(out, data, "enc {enc_chunk} / dec {dec_chunk}");
            }
        }
    }

    #[test]
    fn test_blob_matches_single_shot_gcm() {
        let blob = seal(b"hello world", "D-1", "1:abc");
        let header = BlobHeader::parse(&blob).unwrap();
        let key = derive_doc_key("D-1", secret().as_bytes()).unwrap();
        let plaintext = crate::aead::decrypt_sym_with_aad(
            &blob[HEADER_SIZE..],
            &key,
            &header.iv,
            &blob[..HEADER_SIZE],
        )
        .unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    fn legacy_blob(data: &[u8]) -> Vec<u8> {
        let key = derive_doc_key("D-1", secret().as_bytes()).unwrap();
        let (iv, ciphertext) = crate::legacy::encrypt_ctr(data, &key).unwrap();
        let mut header = BlobHeader::new("D-1", "1:abc", iv);
        header.method = EncryptionMethod::Aes256Ctr;
        let mut blob = header.to_bytes().unwrap();
        blob.extend_from_slice(&ciphertext);
        blob
    }

    #[test]
    fn test_legacy_blob_needs_opt_in() {
        let blob = legacy_blob(b"old data");
        let secret = secret();
        let err = BlobDecryptor::new("D-1", "1:abc", &secret).decrypt(&blob).unwrap_err();
        assert!(matches!(err, DocsealError::MalformedBlob(_)));

        let out = BlobDecryptor::new("D-1", "1:abc", &secret)
            .accept_legacy(true)
            .decrypt(&blob)
            .unwrap();
        assert_eq!(out, b"old data");
    }
}
