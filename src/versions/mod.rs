//! Compiler version identifiers, registry catalog, and preview/production views.

mod catalog;
mod registry;
mod view;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use catalog::{classify, is_preview, versions_from_document, VersionCatalog, VersionPartition};
pub use registry::{FetchError, MirrorRegistryClient, RegistryClient};
pub use view::{VersionsType, VersionsView};

/// Registry metadata endpoint for the compiler package.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org/@astrojs/compiler";

/// Pre-release prefix that marks a preview build.
pub const PREVIEW_VERSION_PREFIX: &str = "0.0.0-";

/// Identifier of one published compiler build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_preview(&self) -> bool {
        self.0.starts_with(PREVIEW_VERSION_PREFIX)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(version: &str) -> Self {
        Self(version.to_string())
    }
}

impl From<String> for VersionId {
    fn from(version: String) -> Self {
        Self(version)
    }
}
