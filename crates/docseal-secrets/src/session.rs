//! Document session: the secret store bound to the document and blob codecs
//!
//! New material is always sealed with the active secret and the caller is
//! told which one, so it can record the id next to the document. Opening
//! takes that id back; the active secret is never assumed.

use std::io::{Read, Write};

use docseal_core::config::CryptoConfig;
use docseal_core::{DocsealResult, Document};
use docseal_crypto::{envelope, BlobDecryptor, BlobEncryptor, EncryptedBlob, SecretId};

use crate::recovery::{RecoveryCipher, RecoveryDocument, RecoveryKey};
use crate::store::SecretStore;

pub struct DocCrypto<'a> {
    store: &'a SecretStore,
    config: CryptoConfig,
}

impl<'a> DocCrypto<'a> {
    pub fn new(store: &'a SecretStore) -> Self {
        Self {
            store,
            config: CryptoConfig::default(),
        }
    }

    pub fn with_config(store: &'a SecretStore, config: CryptoConfig) -> DocsealResult<Self> {
        config.validate()?;
        // fail early on a bad cipher name rather than at export time
        config.recovery_cipher.parse::<RecoveryCipher>()?;
        Ok(Self { store, config })
    }

    /// Seal `doc` with the active secret. Returns the enveloped document and
    /// the id of the secret used.
    pub fn encrypt_doc(&self, doc: &Document) -> DocsealResult<(Document, SecretId)> {
        let (id, secret) = self.store.active_secret()?;
        let sealed = envelope::encrypt_doc(doc, &secret)?;
        Ok((sealed, id))
    }

    /// Open an enveloped document with the secret it was sealed under.
    pub fn decrypt_doc(&self, doc: &Document, secret_id: &SecretId) -> DocsealResult<String> {
        let secret = self.store.get(secret_id)?;
        envelope::decrypt_doc_with(doc, &secret, self.config.accept_legacy_blobs)
    }

    pub fn is_encrypted(&self, doc: &Document) -> bool {
        envelope::is_encrypted(doc)
    }

    pub fn encrypt_blob<R: Read, W: Write>(
        &self,
        doc_id: &str,
        doc_rev: &str,
        source: R,
        sink: W,
    ) -> DocsealResult<(EncryptedBlob, SecretId)> {
        let (id, secret) = self.store.active_secret()?;
        let blob = BlobEncryptor::new(doc_id, doc_rev, &secret)
            .with_chunk_size(self.config.chunk_size)
            .encrypt(source, sink)?;
        Ok((blob, id))
    }

    pub fn decrypt_blob<W: Write>(
        &self,
        doc_id: &str,
        doc_rev: &str,
        secret_id: &SecretId,
        blob: &[u8],
        sink: W,
    ) -> DocsealResult<u64> {
        let secret = self.store.get(secret_id)?;
        BlobDecryptor::new(doc_id, doc_rev, &secret)
            .with_chunk_size(self.config.chunk_size)
            .accept_legacy(self.config.accept_legacy_blobs)
            .decrypt_to(blob, sink)
    }

    /// Export the store with the configured recovery cipher.
    pub fn export_recovery(&self, key: &RecoveryKey) -> DocsealResult<RecoveryDocument> {
        let cipher = self.config.recovery_cipher.parse::<RecoveryCipher>()?;
        self.store.export_recovery(key, cipher)
    }
}
