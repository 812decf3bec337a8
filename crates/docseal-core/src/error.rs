use thiserror::Error;

pub type DocsealResult<T> = Result<T, DocsealError>;

#[derive(Debug, Error)]
pub enum DocsealError {
    /// Tag verification failed: ciphertext or header tampered, or wrong key/IV/secret.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    #[error("document mismatch: expected {field} {expected:?}, blob carries {found:?}")]
    DocumentMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("unknown secret: {0}")]
    UnknownSecret(String),

    #[error("unsupported recovery cipher: {0}")]
    UnsupportedRecoveryCipher(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("{field} too long: {got} bytes (maximum {max})")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        got: usize,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocsealError {
    /// True when the operation may succeed if the caller supplies a different
    /// secret. Everything else is terminal for the given inputs.
    pub fn is_retryable_with_other_secret(&self) -> bool {
        matches!(self, DocsealError::UnknownSecret(_))
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        DocsealError::MalformedBlob(msg.into())
    }

    pub fn key_material(msg: impl Into<String>) -> Self {
        DocsealError::InvalidKeyMaterial(msg.into())
    }
}
