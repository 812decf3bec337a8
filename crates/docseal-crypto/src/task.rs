//! Async wrappers: run the blob codec on tokio's blocking pool

use docseal_core::{DocsealError, DocsealResult};

use crate::blob::{BlobDecryptor, BlobEncryptor};
use crate::secret::MasterSecret;

/// Seal `plaintext` for `doc_id`/`doc_rev` without blocking the runtime.
pub async fn encrypt_blob_task(
    doc_id: String,
    doc_rev: String,
    secret: MasterSecret,
    plaintext: Vec<u8>,
    chunk_size: usize,
) -> DocsealResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        BlobEncryptor::new(&doc_id, &doc_rev, &secret)
            .with_chunk_size(chunk_size)
            .encrypt_to_vec(plaintext.as_slice())
    })
    .await
    .map_err(|e| DocsealError::Task(format!("encrypt task: {e}")))?
}

/// Verify and open `blob` without blocking the runtime.
pub async fn decrypt_blob_task(
    doc_id: String,
    doc_rev: String,
    secret: MasterSecret,
    blob: Vec<u8>,
    accept_legacy: bool,
) -> DocsealResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        BlobDecryptor::new(&doc_id, &doc_rev, &secret)
            .accept_legacy(accept_legacy)
            .decrypt(&blob)
    })
    .await
    .map_err(|e| DocsealError::Task(format!("decrypt task: {e}")))?
}
