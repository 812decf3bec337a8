use serde::{Deserialize, Serialize};

/// A document as the store hands it to the crypto layer.
///
/// `content` is the JSON body: plaintext before encryption, the
/// `{"raw": ...}` envelope after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub rev: String,
    pub content: Option<String>,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, rev: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev: rev.into(),
            content: Some(content.into()),
        }
    }

    /// A document with identity only, e.g. before its body has been fetched.
    pub fn empty(doc_id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev: rev.into(),
            content: None,
        }
    }

    pub fn set_json(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
    }
}
