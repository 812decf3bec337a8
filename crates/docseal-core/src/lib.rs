pub mod config;
pub mod error;
pub mod types;

pub use error::{DocsealError, DocsealResult};
pub use types::Document;
