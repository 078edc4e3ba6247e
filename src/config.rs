//! Configuration loading from environment variables and an optional TOML file.
//!
//! Values come from `PLAYGROUND_*` environment variables, then from the TOML
//! file named by `PLAYGROUND_CONFIG`, then from defaults. Invalid values fall
//! back to the next layer without failing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PLAYGROUND_REGISTRY_URL` | `https://registry.npmjs.org/@astrojs/compiler` | Registry metadata endpoint |
//! | `PLAYGROUND_REGISTRY_MIRROR` | unset | Mirrored registry document on disk |
//! | `PLAYGROUND_CDN_PREFIX` | `https://esm.sh/@astrojs/compiler` | Module code URL prefix |
//! | `PLAYGROUND_RUNTIME_ASSET` | `astro.wasm` | Runtime asset file name |
//! | `PLAYGROUND_CATALOG_TTL_MS` | 10000 | Version listing cache lifetime |
//! | `PLAYGROUND_VERDICT_TTL_SECS` | 86400 | Compatibility verdict lifetime |
//! | `PLAYGROUND_DRAIN_TIMEOUT_MS` | 2000 | Wait for running outputs before teardown |
//! | `PLAYGROUND_STORAGE_DIR` | `.playground` | Durable storage directory |
//! | `PLAYGROUND_LOG_LEVEL` | `info` | `EnvFilter` directive string |
//! | `PLAYGROUND_LOG_FORMAT` | `json` | `json` or `pretty` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::{DEFAULT_CDN_PREFIX, DEFAULT_RUNTIME_ASSET};
use crate::telemetry::{LogConfig, LogFormat};
use crate::versions::DEFAULT_REGISTRY_URL;

pub const CONFIG_FILE_VAR: &str = "PLAYGROUND_CONFIG";

pub const DEFAULT_CATALOG_TTL_MS: u64 = 10_000;
pub const DEFAULT_VERDICT_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_STORAGE_DIR: &str = ".playground";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Values accepted from the TOML file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub registry_url: Option<String>,
    pub registry_mirror: Option<PathBuf>,
    pub cdn_prefix: Option<String>,
    pub runtime_asset: Option<String>,
    pub catalog_ttl_ms: Option<u64>,
    pub verdict_ttl_secs: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub storage_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

/// Read and parse a TOML config file.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Effective configuration summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub registry_url: String,
    pub registry_mirror: Option<String>,
    pub cdn_prefix: String,
    pub runtime_asset: String,
    pub catalog_ttl_ms: u64,
    pub verdict_ttl_secs: u64,
    pub drain_timeout_ms: u64,
    pub storage_dir: String,
    pub log_level: String,
    pub log_format: &'static str,
}

/// All configuration, resolved.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub registry_url: String,
    pub registry_mirror: Option<PathBuf>,
    pub cdn_prefix: String,
    pub runtime_asset: String,
    pub catalog_ttl: Duration,
    pub verdict_ttl: Duration,
    pub drain_timeout: Duration,
    pub storage_dir: PathBuf,
    pub log: LogConfig,
    /// Config file that was read, if any.
    pub config_file: Option<PathBuf>,
    /// Why the config file was ignored, if it was.
    pub file_error: Option<String>,
}

impl Default for EnvConfig {
    /// Documented defaults, ignoring the environment.
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            registry_mirror: None,
            cdn_prefix: DEFAULT_CDN_PREFIX.to_string(),
            runtime_asset: DEFAULT_RUNTIME_ASSET.to_string(),
            catalog_ttl: Duration::from_millis(DEFAULT_CATALOG_TTL_MS),
            verdict_ttl: Duration::from_secs(DEFAULT_VERDICT_TTL_SECS),
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            log: LogConfig::default(),
            config_file: None,
            file_error: None,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a `u64` env var; missing or invalid yields `fallback`.
fn parse_u64(key: &str, fallback: u64) -> u64 {
    match env_var(key) {
        Some(val) => val.trim().parse::<u64>().unwrap_or(fallback),
        None => fallback,
    }
}

fn string_var(key: &str, file: Option<String>, default: &str) -> String {
    env_var(key).or(file).unwrap_or_else(|| default.to_string())
}

fn path_var(key: &str, file: Option<PathBuf>) -> Option<PathBuf> {
    env_var(key).map(PathBuf::from).or(file)
}

fn load_log_config(file: &FileConfig) -> LogConfig {
    let level = string_var("PLAYGROUND_LOG_LEVEL", file.log_level.clone(), "info");
    let format = env_var("PLAYGROUND_LOG_FORMAT")
        .and_then(|name| LogFormat::from_name(&name))
        .or_else(|| file.log_format.as_deref().and_then(LogFormat::from_name))
        .unwrap_or_default();
    LogConfig {
        format,
        level,
        output_path: None,
    }
}

/// Load all configuration.
///
/// An unreadable config file is ignored and reported in `file_error`.
pub fn load() -> EnvConfig {
    let config_file = env_var(CONFIG_FILE_VAR).map(PathBuf::from);
    let (file, file_error) = match &config_file {
        Some(path) => match load_file(path) {
            Ok(file) => (file, None),
            Err(e) => (FileConfig::default(), Some(e.to_string())),
        },
        None => (FileConfig::default(), None),
    };
    resolve(file, config_file, file_error)
}

fn resolve(file: FileConfig, config_file: Option<PathBuf>, file_error: Option<String>) -> EnvConfig {
    let catalog_ms = parse_u64(
        "PLAYGROUND_CATALOG_TTL_MS",
        file.catalog_ttl_ms.unwrap_or(DEFAULT_CATALOG_TTL_MS),
    );
    let verdict_secs = parse_u64(
        "PLAYGROUND_VERDICT_TTL_SECS",
        file.verdict_ttl_secs.unwrap_or(DEFAULT_VERDICT_TTL_SECS),
    )
    .max(1);
    let drain_ms = parse_u64(
        "PLAYGROUND_DRAIN_TIMEOUT_MS",
        file.drain_timeout_ms.unwrap_or(DEFAULT_DRAIN_TIMEOUT_MS),
    )
    .max(1);

    EnvConfig {
        registry_url: string_var("PLAYGROUND_REGISTRY_URL", file.registry_url.clone(), DEFAULT_REGISTRY_URL),
        registry_mirror: path_var("PLAYGROUND_REGISTRY_MIRROR", file.registry_mirror.clone()),
        cdn_prefix: string_var("PLAYGROUND_CDN_PREFIX", file.cdn_prefix.clone(), DEFAULT_CDN_PREFIX),
        runtime_asset: string_var("PLAYGROUND_RUNTIME_ASSET", file.runtime_asset.clone(), DEFAULT_RUNTIME_ASSET),
        catalog_ttl: Duration::from_millis(catalog_ms),
        verdict_ttl: Duration::from_secs(verdict_secs),
        drain_timeout: Duration::from_millis(drain_ms),
        storage_dir: path_var("PLAYGROUND_STORAGE_DIR", file.storage_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
        log: load_log_config(&file),
        config_file,
        file_error,
    }
}

impl EnvConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            registry_url: self.registry_url.clone(),
            registry_mirror: self.registry_mirror.as_ref().map(|p| p.display().to_string()),
            cdn_prefix: self.cdn_prefix.clone(),
            runtime_asset: self.runtime_asset.clone(),
            catalog_ttl_ms: self.catalog_ttl.as_millis() as u64,
            verdict_ttl_secs: self.verdict_ttl.as_secs(),
            drain_timeout_ms: self.drain_timeout.as_millis() as u64,
            storage_dir: self.storage_dir.display().to_string(),
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str(),
        }
    }
}
