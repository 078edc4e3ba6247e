// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for offline playground maintenance.
//!
//! Inspects the version catalog through a mirrored registry document and the
//! durable verdict store, without loading any compiler module.
//!
//! ## Usage
//!
//! ```bash
//! playground-cli versions --preview   # List preview builds
//! playground-cli verdict 2.0.9        # Show the stored verdict
//! playground-cli last-used            # Print the last-used pointer
//! playground-cli forget 2.0.9         # Drop a stored verdict
//! ```

pub mod config_cmd;
pub mod store_cmd;
pub mod versions_cmd;

use std::sync::Arc;

use thiserror::Error;

use crate::config::EnvConfig;
use crate::storage::{CompatibilityStore, FileStore, StorageError};
use crate::versions::{FetchError, MirrorRegistryClient, VersionCatalog};

pub use store_cmd::{run_forget, run_last_used, run_verdict};
pub use versions_cmd::{run_versions, VersionsArgs};

/// Exit code for configuration problems.
pub const EXIT_CONFIG: i32 = 2;

/// Exit code when the registry mirror or the store cannot be read.
pub const EXIT_UNAVAILABLE: i32 = 3;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("PLAYGROUND_REGISTRY_MIRROR is not set; the CLI only reads mirrored registry documents")]
    NoMirror,

    #[error("Storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoMirror => EXIT_CONFIG,
            Self::Storage(_) | Self::Fetch(_) => EXIT_UNAVAILABLE,
        }
    }
}

/// Verdict store under the configured storage directory.
pub fn open_store(config: &EnvConfig) -> Result<CompatibilityStore, CliError> {
    let kv = FileStore::open(&config.storage_dir)?;
    Ok(CompatibilityStore::new(Arc::new(kv), config.verdict_ttl))
}

/// Catalog over the configured registry mirror.
pub fn open_catalog(config: &EnvConfig) -> Result<VersionCatalog, CliError> {
    let mirror = config.registry_mirror.as_ref().ok_or(CliError::NoMirror)?;
    Ok(VersionCatalog::new(
        Arc::new(MirrorRegistryClient::new(mirror)),
        config.registry_url.clone(),
        config.catalog_ttl,
    ))
}
