use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DocsealError, DocsealResult};

/// Smallest master secret accepted anywhere in the stack (256 bits).
pub const MIN_SECRET_LENGTH: usize = 32;

/// Top-level configuration (loaded from docseal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsealConfig {
    pub crypto: CryptoConfig,
    pub secrets: SecretsConfig,
}

impl DocsealConfig {
    /// Read and parse a TOML config file. Missing sections take defaults.
    pub fn load(path: &Path) -> DocsealResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DocsealConfig = toml::from_str(&content)?;
        config.crypto.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Document and blob encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Buffering chunk size for the streaming engine in bytes (default: 4096)
    pub chunk_size: usize,
    /// Length of newly generated master secrets in bytes (default: 96)
    pub secret_length: usize,
    /// Cipher used when exporting recovery documents: "aes_256_gcm" or "aes256"
    pub recovery_cipher: String,
    /// Decrypt blobs written with the retired unauthenticated method (default: false)
    pub accept_legacy_blobs: bool,
}

impl CryptoConfig {
    pub fn validate(&self) -> DocsealResult<()> {
        if self.chunk_size == 0 {
            return Err(DocsealError::Config("chunk_size must be non-zero".into()));
        }
        if self.secret_length < MIN_SECRET_LENGTH {
            return Err(DocsealError::Config(format!(
                "secret_length must be at least {MIN_SECRET_LENGTH} bytes, got {}",
                self.secret_length
            )));
        }
        Ok(())
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            secret_length: 96,
            recovery_cipher: "aes_256_gcm".into(),
            accept_legacy_blobs: false,
        }
    }
}

/// Secret store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Where the encrypted secret store is persisted (in-memory only if unset)
    pub store_path: Option<PathBuf>,
    /// Generate a first secret when the store is opened empty (default: true)
    pub auto_generate: bool,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            auto_generate: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[crypto]
chunk_size = 16
secret_length = 64
recovery_cipher = "aes256"
accept_legacy_blobs = true

[secrets]
store_path = "/var/lib/docseal/secrets.json"
auto_generate = false
"#;
        let config: DocsealConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.crypto.chunk_size, 16);
        assert_eq!(config.crypto.secret_length, 64);
        assert_eq!(config.crypto.recovery_cipher, "aes256");
        assert!(config.crypto.accept_legacy_blobs);
        assert_eq!(
            config.secrets.store_path,
            Some(PathBuf::from("/var/lib/docseal/secrets.json"))
        );
        assert!(!config.secrets.auto_generate);
    }

    #[test]
    fn test_parse_defaults() {
        let config: DocsealConfig = toml::from_str("").unwrap();

        assert_eq!(config.crypto.chunk_size, 4096);
        assert_eq!(config.crypto.secret_length, 96);
        assert_eq!(config.crypto.recovery_cipher, "aes_256_gcm");
        assert!(!config.crypto.accept_legacy_blobs);
        assert!(config.secrets.store_path.is_none());
        assert!(config.secrets.auto_generate);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[crypto]
chunk_size = 65536
"#;
        let config: DocsealConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.crypto.chunk_size, 65536);
        // Defaults
        assert_eq!(config.crypto.secret_length, 96);
        assert!(config.secrets.auto_generate);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_chunk = CryptoConfig {
            chunk_size: 0,
            ..CryptoConfig::default()
        };
        assert!(zero_chunk.validate().is_err());

        let short_secret = CryptoConfig {
            secret_length: 16,
            ..CryptoConfig::default()
        };
        assert!(short_secret.validate().is_err());

        assert!(CryptoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docseal.toml");
        std::fs::write(&path, "[crypto]\nchunk_size = 512\n").unwrap();

        let config = DocsealConfig::load(&path).unwrap();
        assert_eq!(config.crypto.chunk_size, 512);

        std::fs::write(&path, "[crypto]\nchunk_size = 0\n").unwrap();
        assert!(matches!(
            DocsealConfig::load(&path),
            Err(DocsealError::Config(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = DocsealConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DocsealConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.crypto.chunk_size, parsed.crypto.chunk_size);
        assert_eq!(config.crypto.recovery_cipher, parsed.crypto.recovery_cipher);
    }
}
