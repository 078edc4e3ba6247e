//! Registry-backed list of compiler versions with a short-lived cache.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::registry::{FetchError, RegistryClient};
use super::VersionId;
use crate::telemetry;

/// Catalog split into preview and production builds, each newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionPartition {
    pub preview_versions: Vec<VersionId>,
    pub production_versions: Vec<VersionId>,
}

pub fn is_preview(version: &VersionId) -> bool {
    version.is_preview()
}

/// Partition `versions` by the preview prefix, keeping relative order.
pub fn classify(versions: &[VersionId]) -> VersionPartition {
    let mut partition = VersionPartition::default();
    for version in versions {
        if version.is_preview() {
            partition.preview_versions.push(version.clone());
        } else {
            partition.production_versions.push(version.clone());
        }
    }
    partition
}

/// Extract version ids from a registry metadata document, newest first.
///
/// Registry documents list `versions` in publish order (oldest first).
pub fn versions_from_document(document: &Value) -> Result<Vec<VersionId>, FetchError> {
    let versions = document
        .get("versions")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::InvalidDocument("missing `versions` object".into()))?;

    Ok(versions.keys().rev().map(|k| VersionId::new(k.as_str())).collect())
}

struct CachedListing {
    fetched_at: Instant,
    versions: Arc<Vec<VersionId>>,
}

/// Lists published compiler versions.
///
/// Successful listings are cached for `ttl` to coalesce bursts of refreshes;
/// failures are never cached.
pub struct VersionCatalog {
    client: Arc<dyn RegistryClient>,
    registry_url: String,
    ttl: Duration,
    cache: Mutex<Option<CachedListing>>,
}

impl VersionCatalog {
    pub fn new(client: Arc<dyn RegistryClient>, registry_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            registry_url: registry_url.into(),
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// All versions, newest first. `force_refresh` bypasses and repopulates the cache.
    pub async fn list_versions(&self, force_refresh: bool) -> Result<Arc<Vec<VersionId>>, FetchError> {
        if !force_refresh {
            if let Some(versions) = self.cached() {
                telemetry::record_catalog_lookup(true);
                return Ok(versions);
            }
        }
        telemetry::record_catalog_lookup(false);

        let document = match self.client.fetch_document(&self.registry_url, force_refresh).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(url = %self.registry_url, error = %e, "Error fetching compiler versions");
                return Err(e);
            }
        };
        let versions = Arc::new(versions_from_document(&document)?);
        debug!(count = versions.len(), force_refresh, "Fetched compiler versions");

        *self.cache.lock() = Some(CachedListing {
            fetched_at: Instant::now(),
            versions: versions.clone(),
        });
        Ok(versions)
    }

    /// Catalog partitioned into preview and production builds.
    pub async fn partitioned(&self, force_refresh: bool) -> Result<VersionPartition, FetchError> {
        let versions = self.list_versions(force_refresh).await?;
        Ok(classify(&versions))
    }

    /// Newest production build.
    pub async fn latest_production(&self) -> Result<VersionId, FetchError> {
        let versions = self.list_versions(false).await?;
        versions
            .iter()
            .find(|v| !v.is_preview())
            .cloned()
            .ok_or(FetchError::NoProductionVersions)
    }

    fn cached(&self) -> Option<Arc<Vec<VersionId>>> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.versions.clone())
    }
}
