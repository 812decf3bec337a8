//! Master secret store
//!
//! Holds every master secret this client knows, keyed by [`SecretId`], plus
//! which one is active for new encryptions. Readers never see a half-applied
//! import: mutations take the write lock once and apply in full.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use docseal_core::config::{DocsealConfig, MIN_SECRET_LENGTH};
use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::secret::MASTER_SECRET_LENGTH;
use docseal_crypto::{MasterSecret, SecretId};

use crate::recovery::{RecoveryCipher, RecoveryDocument, RecoveryKey};

/// Version tag of the persisted store file.
pub const STORE_FORMAT_VERSION: u32 = 2;

#[derive(Default)]
struct Inner {
    secrets: BTreeMap<SecretId, MasterSecret>,
    active: Option<SecretId>,
}

pub struct SecretStore {
    inner: RwLock<Inner>,
    secret_length: usize,
}

/// On-disk form: the recovery document plus the active id.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    active_secret: Option<SecretId>,
    storage_secrets: RecoveryDocument,
}

impl SecretStore {
    /// Store holding one freshly generated 96-byte secret, already active.
    pub fn new() -> DocsealResult<Self> {
        Self::with_secret_length(MASTER_SECRET_LENGTH)
    }

    /// Store holding one freshly generated secret of `secret_length` bytes.
    pub fn with_secret_length(secret_length: usize) -> DocsealResult<Self> {
        let store = Self::empty_with_length(secret_length)?;
        store.generate_secret()?;
        Ok(store)
    }

    /// Store with no secrets, as a target for [`SecretStore::import_recovery`]
    /// or [`SecretStore::insert`]. Nothing can be encrypted until a secret is
    /// added.
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            secret_length: MASTER_SECRET_LENGTH,
        }
    }

    fn empty_with_length(secret_length: usize) -> DocsealResult<Self> {
        if secret_length < MIN_SECRET_LENGTH {
            return Err(DocsealError::key_material(format!(
                "secret length must be at least {MIN_SECRET_LENGTH} bytes, got {secret_length}"
            )));
        }
        Ok(Self {
            inner: RwLock::new(Inner::default()),
            secret_length,
        })
    }

    /// Build a store from config: load `secrets.store_path` when it exists,
    /// otherwise generate the first secret. With `secrets.auto_generate` off
    /// and nothing to load, fails with `Config`.
    pub fn open(config: &DocsealConfig, key: &RecoveryKey) -> DocsealResult<Self> {
        config.crypto.validate()?;
        let store = Self::empty_with_length(config.crypto.secret_length)?;

        if let Some(path) = &config.secrets.store_path {
            if path.exists() {
                store.load_from(path, key)?;
            }
        }
        if store.is_empty() {
            if !config.secrets.auto_generate {
                return Err(DocsealError::Config(
                    "secret store is empty and secrets.auto_generate is disabled".into(),
                ));
            }
            store.generate_secret()?;
        }
        Ok(store)
    }

    /// Generate and add a fresh secret. It becomes active only if no secret
    /// was active yet.
    pub fn generate_secret(&self) -> DocsealResult<SecretId> {
        let secret = MasterSecret::generate(self.secret_length)?;
        let id = secret.id();

        let mut inner = self.inner.write();
        inner.secrets.insert(id.clone(), secret);
        if inner.active.is_none() {
            inner.active = Some(id.clone());
        }
        drop(inner);

        tracing::debug!(secret_id = %id, length = self.secret_length, "generated master secret");
        Ok(id)
    }

    /// Add existing secret bytes. Returns the id they are filed under.
    pub fn insert(&self, secret: MasterSecret) -> SecretId {
        let id = secret.id();
        let mut inner = self.inner.write();
        inner.secrets.insert(id.clone(), secret);
        if inner.active.is_none() {
            inner.active = Some(id.clone());
        }
        id
    }

    /// The active secret and its id.
    pub fn active_secret(&self) -> DocsealResult<(SecretId, MasterSecret)> {
        let inner = self.inner.read();
        let id = inner
            .active
            .clone()
            .ok_or_else(|| DocsealError::UnknownSecret("no active secret".into()))?;
        let secret = inner
            .secrets
            .get(&id)
            .cloned()
            .ok_or_else(|| DocsealError::UnknownSecret(id.to_string()))?;
        Ok((id, secret))
    }

    pub fn active_secret_id(&self) -> Option<SecretId> {
        self.inner.read().active.clone()
    }

    pub fn get(&self, id: &SecretId) -> DocsealResult<MasterSecret> {
        self.inner
            .read()
            .secrets
            .get(id)
            .cloned()
            .ok_or_else(|| DocsealError::UnknownSecret(id.to_string()))
    }

    /// True when the store holds at least one secret.
    pub fn has_secret(&self) -> bool {
        !self.inner.read().secrets.is_empty()
    }

    pub fn contains(&self, id: &SecretId) -> bool {
        self.inner.read().secrets.contains_key(id)
    }

    pub fn set_active(&self, id: &SecretId) -> DocsealResult<()> {
        let mut inner = self.inner.write();
        if !inner.secrets.contains_key(id) {
            return Err(DocsealError::UnknownSecret(id.to_string()));
        }
        inner.active = Some(id.clone());
        drop(inner);

        tracing::debug!(secret_id = %id, "active secret switched");
        Ok(())
    }

    pub fn ids(&self) -> Vec<SecretId> {
        self.inner.read().secrets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().secrets.is_empty()
    }

    /// Wrap every secret under `key` with `cipher`.
    pub fn export_recovery(&self, key: &RecoveryKey, cipher: RecoveryCipher) -> DocsealResult<RecoveryDocument> {
        let inner = self.inner.read();
        let document = RecoveryDocument::seal(inner.secrets.iter(), key, cipher)?;
        drop(inner);

        if cipher == RecoveryCipher::LegacyAes256 {
            tracing::warn!("exporting recovery document with unauthenticated aes256 wrapping");
        }
        tracing::info!(secrets = document.len(), cipher = %cipher, "exported recovery document");
        Ok(document)
    }

    /// Unwrap every record and add the secrets. All records must open or
    /// nothing is added. Existing secrets and the active id are untouched;
    /// legacy records are not rewrapped.
    pub fn import_recovery(&self, document: &RecoveryDocument, key: &RecoveryKey) -> DocsealResult<Vec<SecretId>> {
        let staged = document.open(key)?;
        let ids: Vec<SecretId> = staged.iter().map(|(id, _)| id.clone()).collect();

        let mut inner = self.inner.write();
        for (id, secret) in staged {
            inner.secrets.insert(id, secret);
        }
        drop(inner);

        tracing::info!(secrets = ids.len(), "imported recovery document");
        Ok(ids)
    }

    /// Persist to `path` (temp file + rename). Secrets are wrapped with
    /// AES-256-GCM under `key`. The active id and the secrets come from one
    /// snapshot.
    pub fn save(&self, path: &Path, key: &RecoveryKey) -> DocsealResult<()> {
        let inner = self.inner.read();
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            active_secret: inner.active.clone(),
            storage_secrets: RecoveryDocument::seal(inner.secrets.iter(), key, RecoveryCipher::Aes256Gcm)?,
        };
        drop(inner);

        let json = serde_json::to_string_pretty(&file)?;
        atomic_write(path, json.as_bytes())?;

        tracing::info!(path = %path.display(), secrets = file.storage_secrets.len(), "secret store saved");
        Ok(())
    }

    /// Read a store previously written by [`SecretStore::save`]. A file with
    /// no secrets in it is a `Config` error.
    pub fn load(path: &Path, key: &RecoveryKey) -> DocsealResult<Self> {
        let store = Self::empty();
        store.load_from(path, key)?;
        if store.is_empty() {
            return Err(DocsealError::Config(format!(
                "secret store {} holds no secrets",
                path.display()
            )));
        }
        Ok(store)
    }

    fn load_from(&self, path: &Path, key: &RecoveryKey) -> DocsealResult<()> {
        let content = std::fs::read_to_string(path)?;
        let file: StoreFile = serde_json::from_str(&content)?;
        if file.version != STORE_FORMAT_VERSION {
            return Err(DocsealError::Config(format!(
                "unsupported secret store version {} in {}",
                file.version,
                path.display()
            )));
        }

        let staged = file.storage_secrets.open(key)?;
        let mut inner = self.inner.write();
        for (id, secret) in staged {
            inner.secrets.insert(id, secret);
        }
        match file.active_secret {
            Some(id) if inner.secrets.contains_key(&id) => inner.active = Some(id),
            Some(id) => {
                tracing::warn!(secret_id = %id, "persisted active secret not in store");
            }
            None => {}
        }
        if inner.active.is_none() {
            inner.active = inner.secrets.keys().next().cloned();
        }
        let count = inner.secrets.len();
        drop(inner);

        tracing::info!(path = %path.display(), secrets = count, "secret store loaded");
        Ok(())
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SecretStore")
            .field("secrets", &inner.secrets.len())
            .field("active", &inner.active)
            .finish()
    }
}

/// Write to a sibling temp file, then rename over `path`.
fn atomic_write(path: &Path, content: &[u8]) -> DocsealResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
