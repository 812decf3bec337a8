//! JSON document envelope
//!
//! An encrypted document body is `{"raw": "<b64url header> <b64url ciphertext||tag>"}`.
//! Splitting the header out lets a reader inspect it (and sniff the format)
//! without touching the ciphertext.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use docseal_core::{DocsealError, DocsealResult, Document};

use crate::blob::{BlobDecryptor, BlobEncryptor, BlobHeader, HEADER_SIZE};
use crate::secret::MasterSecret;

const SEPARATOR: char = ' ';

/// Body of an encrypted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDocument {
    pub raw: String,
}

impl EncryptedDocument {
    /// Build from a complete blob (`header || ciphertext || tag`).
    pub fn from_blob(blob: &[u8]) -> DocsealResult<Self> {
        if blob.len() < HEADER_SIZE {
            return Err(DocsealError::malformed("blob shorter than its header"));
        }
        let (header, body) = blob.split_at(HEADER_SIZE);
        Ok(Self {
            raw: format!("{}{SEPARATOR}{}", URL_SAFE.encode(header), URL_SAFE.encode(body)),
        })
    }

    /// Reassemble the binary blob.
    pub fn to_blob(&self) -> DocsealResult<Vec<u8>> {
        let (header, body) = self
            .raw
            .split_once(SEPARATOR)
            .ok_or_else(|| DocsealError::malformed("envelope is missing the header separator"))?;
        let mut blob = URL_SAFE.decode(header)?;
        if blob.len() != HEADER_SIZE {
            return Err(DocsealError::malformed(format!(
                "envelope header is {} bytes, expected {HEADER_SIZE}",
                blob.len()
            )));
        }
        blob.extend_from_slice(&URL_SAFE.decode(body)?);
        Ok(blob)
    }

    /// Decode and parse only the header component.
    pub fn header(&self) -> DocsealResult<BlobHeader> {
        let header = self.raw.split(SEPARATOR).next().unwrap_or_default();
        BlobHeader::parse(&URL_SAFE.decode(header)?)
    }

    pub fn from_json(json: &str) -> DocsealResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> DocsealResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encrypt a document body for its own id and revision.
///
/// Returns a copy of `doc` whose content is the envelope JSON. A document
/// without content is sealed as the JSON literal `null`.
pub fn encrypt_doc(doc: &Document, secret: &MasterSecret) -> DocsealResult<Document> {
    let plaintext = doc.content.as_deref().unwrap_or("null");
    let blob = BlobEncryptor::new(&doc.doc_id, &doc.rev, secret).encrypt_to_vec(plaintext.as_bytes())?;
    let envelope = EncryptedDocument::from_blob(&blob)?;
    let mut sealed = doc.clone();
    sealed.set_json(envelope.to_json()?);
    Ok(sealed)
}

/// Decrypt an enveloped document back to its plaintext JSON body.
pub fn decrypt_doc(doc: &Document, secret: &MasterSecret) -> DocsealResult<String> {
    decrypt_doc_with(doc, secret, false)
}

/// Like [`decrypt_doc`], optionally accepting retired unauthenticated blobs.
pub fn decrypt_doc_with(doc: &Document, secret: &MasterSecret, accept_legacy: bool) -> DocsealResult<String> {
    let content = doc
        .content
        .as_deref()
        .ok_or_else(|| DocsealError::malformed(format!("document {} has no content", doc.doc_id)))?;
    let blob = EncryptedDocument::from_json(content)?.to_blob()?;
    let plaintext = BlobDecryptor::new(&doc.doc_id, &doc.rev, secret)
        .accept_legacy(accept_legacy)
        .decrypt(&blob)?;
    String::from_utf8(plaintext).map_err(|_| DocsealError::malformed("decrypted body is not UTF-8"))
}

/// Format check on the header component only; nothing is decrypted or verified.
pub fn is_encrypted(doc: &Document) -> bool {
    doc.content
        .as_deref()
        .and_then(|content| EncryptedDocument::from_json(content).ok())
        .map(|envelope| envelope.header().is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::MASTER_SECRET_LENGTH;
    use crate::TAG_SIZE;

    fn secret() -> MasterSecret {
        MasterSecret::from_bytes(vec![b'A'; MASTER_SECRET_LENGTH]).unwrap()
    }

    #[test]
    fn test_doc_roundtrip() {
        let doc = Document::new("D-1", "1:abc", r#"{"title":"hello world"}"#);
        let sealed = encrypt_doc(&doc, &secret()).unwrap();
        assert_eq!(sealed.doc_id, "D-1");
        assert_eq!(sealed.rev, "1:abc");
        assert!(is_encrypted(&sealed));
        assert!(!is_encrypted(&doc));

        assert_eq!(decrypt_doc(&sealed, &secret()).unwrap(), r#"{"title":"hello world"}"#);
    }

    #[test]
    fn test_envelope_shape() {
        let sealed = encrypt_doc(&Document::new("D-1", "1:abc", "hello world"), &secret()).unwrap();
        let value: serde_json::Value = serde_json::from_str(sealed.content.as_deref().unwrap()).unwrap();
        let raw = value["raw"].as_str().unwrap();
        let parts: Vec<&str> = raw.split(' ').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(URL_SAFE.decode(parts[0]).unwrap().len(), HEADER_SIZE);
        assert_eq!(URL_SAFE.decode(parts[1]).unwrap().len(), "hello world".len() + TAG_SIZE);
    }

    #[test]
    fn test_empty_content_seals_null() {
        let sealed = encrypt_doc(&Document::empty("D-1", "1:abc"), &secret()).unwrap();
        assert_eq!(decrypt_doc(&sealed, &secret()).unwrap(), "null");
        assert!(decrypt_doc(&Document::empty("D-1", "1:abc"), &secret()).is_err());
    }

    #[test]
    fn test_tampered_envelope_fails() {
        let sealed = encrypt_doc(&Document::new("D-1", "1:abc", "hello world"), &secret()).unwrap();
        let envelope = EncryptedDocument::from_json(sealed.content.as_deref().unwrap()).unwrap();
        let mut blob = envelope.to_blob().unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x80;
        let tampered = EncryptedDocument::from_blob(&blob).unwrap();
        let doc = Document::new("D-1", "1:abc", tampered.to_json().unwrap());

        assert!(is_encrypted(&doc), "sniffing does not verify");
        assert!(matches!(
            decrypt_doc(&doc, &secret()),
            Err(DocsealError::Authentication(_))
        ));
    }

    #[test]
    fn test_envelope_bound_to_revision() {
        let sealed = encrypt_doc(&Document::new("D-1", "1:abc", "hello world"), &secret()).unwrap();
        let moved = Document::new("D-1", "2:def", sealed.content.unwrap());
        assert!(matches!(
            decrypt_doc(&moved, &secret()),
            Err(DocsealError::DocumentMismatch { field: "doc_rev", .. })
        ));
    }

    #[test]
    fn test_is_encrypted_rejects_lookalikes() {
        assert!(!is_encrypted(&Document::new("D-1", "1", r#"{"raw":"abc def"}"#)));
        assert!(!is_encrypted(&Document::new("D-1", "1", r#"{"raw":"not base64!"}"#)));
        assert!(!is_encrypted(&Document::new("D-1", "1", "not json")));
        assert!(!is_encrypted(&Document::empty("D-1", "1")));
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        let envelope = EncryptedDocument { raw: "AAAA".into() };
        assert!(matches!(envelope.to_blob(), Err(DocsealError::MalformedBlob(_))));
    }

    #[test]
    fn test_shifted_separator_is_malformed() {
        let blob = BlobEncryptor::new("D-1", "1:abc", &secret())
            .encrypt_to_vec(&b"hello world"[..])
            .unwrap();
        // same bytes overall, but one header byte moved into the body
        let (header, body) = blob.split_at(HEADER_SIZE - 1);
        let shifted = EncryptedDocument {
            raw: format!("{} {}", URL_SAFE.encode(header), URL_SAFE.encode(body)),
        };
        assert!(matches!(shifted.to_blob(), Err(DocsealError::MalformedBlob(_))));

        let (header, body) = blob.split_at(HEADER_SIZE + 1);
        let shifted = EncryptedDocument {
            raw: format!("{} {}", URL_SAFE.encode(header), URL_SAFE.encode(body)),
        };
        assert!(matches!(shifted.to_blob(), Err(DocsealError::MalformedBlob(_))));
    }
}
