//! Durable per-version compatibility verdicts and the last-used version pointer.
//!
//! Layout (values are JSON):
//! - `compiler-version-<version>` → `{version, compatibilityMap, expires}`
//! - `last-used-compiler-version` → `"<version>"`
//!
//! Reads never fail: missing, expired or corrupt entries read as absent.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::kv::{KeyValueStore, StorageError};
use crate::compiler::Capability;
use crate::versions::VersionId;

pub const COMPILER_KEY_PREFIX: &str = "compiler-version";

/// Key of the last-used pointer. Shared links depend on this exact name.
pub const LAST_USED_VERSION_KEY: &str = "last-used-compiler-version";

/// Default lifetime of a stored verdict.
pub const DEFAULT_VERDICT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompatibilityStatus {
    Compatible,
    Incompatible,
    /// Reserved for capabilities checked by more than one assertion.
    PartiallyCompatible,
}

/// Per-capability classification of one compiler version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompatibilityVerdict(BTreeMap<Capability, CompatibilityStatus>);

impl CompatibilityVerdict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability marked with `status`.
    pub fn uniform(status: CompatibilityStatus) -> Self {
        Self(Capability::ALL.iter().map(|c| (*c, status)).collect())
    }

    pub fn with(mut self, capability: Capability, status: CompatibilityStatus) -> Self {
        self.0.insert(capability, status);
        self
    }

    pub fn set(&mut self, capability: Capability, status: CompatibilityStatus) {
        self.0.insert(capability, status);
    }

    pub fn get(&self, capability: Capability) -> Option<CompatibilityStatus> {
        self.0.get(&capability).copied()
    }

    /// True when every known capability has a status.
    pub fn is_complete(&self) -> bool {
        Capability::ALL.iter().all(|c| self.0.contains_key(c))
    }

    /// Capabilities that are not fully compatible. Missing ones count as incompatible.
    pub fn unfit(&self) -> Vec<(Capability, CompatibilityStatus)> {
        Capability::ALL
            .iter()
            .filter_map(|c| match self.get(*c) {
                Some(CompatibilityStatus::Compatible) => None,
                Some(status) => Some((*c, status)),
                None => Some((*c, CompatibilityStatus::Incompatible)),
            })
            .collect()
    }

    /// A version is fit only if every capability is compatible.
    pub fn is_fit(&self) -> bool {
        self.unfit().is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, CompatibilityStatus)> + '_ {
        self.0.iter().map(|(c, s)| (*c, *s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCompatibilityRecord {
    pub version: VersionId,
    pub compatibility_map: CompatibilityVerdict,
    pub expires: DateTime<Utc>,
}

/// Result of a verdict lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictLookup {
    /// Never probed, or the record expired or was unreadable.
    Unknown,
    Verified(StoredCompatibilityRecord),
}

impl VerdictLookup {
    pub fn record(&self) -> Option<&StoredCompatibilityRecord> {
        match self {
            VerdictLookup::Unknown => None,
            VerdictLookup::Verified(record) => Some(record),
        }
    }

    /// True only for a stored verdict with every capability compatible.
    pub fn is_verified_fit(&self) -> bool {
        self.record().is_some_and(|r| r.compatibility_map.is_fit())
    }
}

/// Verdict persistence over a `KeyValueStore`.
pub struct CompatibilityStore {
    kv: Arc<dyn KeyValueStore>,
    ttl: chrono::Duration,
}

impl CompatibilityStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        Self { kv, ttl }
    }

    pub fn record_key(version: &VersionId) -> String {
        format!("{}-{}", COMPILER_KEY_PREFIX, version)
    }

    pub fn get_verdict(&self, version: &VersionId) -> VerdictLookup {
        self.get_verdict_at(version, Utc::now())
    }

    /// Look up `version` as of `now`. Expired or corrupt records are deleted.
    pub fn get_verdict_at(&self, version: &VersionId, now: DateTime<Utc>) -> VerdictLookup {
        let key = Self::record_key(version);
        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return VerdictLookup::Unknown,
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable compatibility record");
                return VerdictLookup::Unknown;
            }
        };

        let record = match Self::decode(&key, version, &raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Discarding corrupt compatibility record");
                self.purge(&key);
                return VerdictLookup::Unknown;
            }
        };

        if record.expires <= now {
            debug!(version = %version, expired = %record.expires, "Compatibility record expired");
            self.purge(&key);
            return VerdictLookup::Unknown;
        }
        VerdictLookup::Verified(record)
    }

    pub fn store_verdict(&self, version: &VersionId, verdict: CompatibilityVerdict) -> StoredCompatibilityRecord {
        self.store_verdict_at(version, verdict, Utc::now())
    }

    /// Write `verdict` expiring one TTL after `now`, replacing any previous record.
    pub fn store_verdict_at(
        &self,
        version: &VersionId,
        verdict: CompatibilityVerdict,
        now: DateTime<Utc>,
    ) -> StoredCompatibilityRecord {
        let record = StoredCompatibilityRecord {
            version: version.clone(),
            compatibility_map: verdict,
            expires: now + self.ttl,
        };
        let key = Self::record_key(version);
        match serde_json::to_string(&record) {
            Ok(json) => {
                if let Err(e) = self.kv.set(&key, &json) {
                    warn!(key = %key, error = %e, "Failed to persist compatibility record");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to encode compatibility record"),
        }
        record
    }

    /// Delete the stored verdict for `version`, if any.
    pub fn forget(&self, version: &VersionId) {
        self.purge(&Self::record_key(version));
    }

    /// Versions that currently have a record on disk (expired ones included).
    pub fn recorded_versions(&self) -> Vec<VersionId> {
        let prefix = format!("{}-", COMPILER_KEY_PREFIX);
        match self.kv.keys() {
            Ok(keys) => keys
                .iter()
                .filter_map(|k| k.strip_prefix(&prefix))
                .map(VersionId::from)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list compatibility records");
                Vec::new()
            }
        }
    }

    pub fn last_used_version(&self) -> Option<VersionId> {
        let raw = match self.kv.get(LAST_USED_VERSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Unreadable last-used compiler version");
                return None;
            }
        };
        match serde_json::from_str::<String>(&raw) {
            Ok(version) if !version.is_empty() => Some(VersionId::new(version)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Corrupt last-used compiler version");
                None
            }
        }
    }

    pub fn set_last_used_version(&self, version: &VersionId) {
        let result = serde_json::to_string(version.as_str())
            .map_err(|e| StorageError::Corrupt {
                key: LAST_USED_VERSION_KEY.to_string(),
                reason: e.to_string(),
            })
            .and_then(|json| self.kv.set(LAST_USED_VERSION_KEY, &json));
        if let Err(e) = result {
            warn!(version = %version, error = %e, "Failed to persist last-used compiler version");
        }
    }

    fn decode(key: &str, version: &VersionId, raw: &str) -> Result<StoredCompatibilityRecord, StorageError> {
        let corrupt = |reason: String| StorageError::Corrupt { key: key.to_string(), reason };
        let record: StoredCompatibilityRecord =
            serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;
        if &record.version != version {
            return Err(corrupt(format!("record is for version {}", record.version)));
        }
        if !record.compatibility_map.is_complete() {
            return Err(corrupt("compatibility map is missing capabilities".into()));
        }
        Ok(record)
    }

    fn purge(&self, key: &str) {
        if let Err(e) = self.kv.remove(key) {
            warn!(key = %key, error = %e, "Failed to delete compatibility record");
        }
    }
}
