//! Registry transport seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Registry request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Invalid registry document: {0}")]
    InvalidDocument(String),

    #[error("No production compiler versions found")]
    NoProductionVersions,
}

/// Fetches registry metadata documents.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// GET `url` and parse the body as JSON. `bypass_cache` asks the
    /// transport to skip any intermediate HTTP cache.
    async fn fetch_document(&self, url: &str, bypass_cache: bool) -> Result<Value, FetchError>;
}

/// Serves a registry metadata document mirrored to local disk.
///
/// Every request URL maps to the same document.
pub struct MirrorRegistryClient {
    document: PathBuf,
}

impl MirrorRegistryClient {
    pub fn new(document: impl Into<PathBuf>) -> Self {
        Self { document: document.into() }
    }

    pub fn document_path(&self) -> &Path {
        &self.document
    }
}

#[async_trait]
impl RegistryClient for MirrorRegistryClient {
    async fn fetch_document(&self, url: &str, _bypass_cache: bool) -> Result<Value, FetchError> {
        let content = tokio::fs::read_to_string(&self.document)
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: format!("{}: {}", self.document.display(), e),
            })?;
        serde_json::from_str(&content).map_err(|e| FetchError::InvalidDocument(e.to_string()))
    }
}
