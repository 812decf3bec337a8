//! docseal-secrets: master secret management
//!
//! - [`SecretStore`]: the set of master secrets plus the active one, shared
//!   behind a read-write lock, optionally persisted to disk
//! - [`RecoveryDocument`]: every secret wrapped under a recovery key, for
//!   backup and for moving secrets to another client
//! - [`DocCrypto`]: document and blob encryption against a store

pub mod recovery;
pub mod session;
pub mod store;

pub use recovery::{EncryptedSecretRecord, RecoveryCipher, RecoveryDocument, RecoveryKey};
pub use session::DocCrypto;
pub use store::SecretStore;
