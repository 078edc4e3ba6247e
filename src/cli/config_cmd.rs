// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let env = config::load();
    if let Some(path) = &env.config_file {
        println!("# config file: {}", path.display());
    }
    print_config(&env.effective_config());
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&EnvConfig::default().effective_config());
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let warnings = validate(&config::load());
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(env: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(reason) = &env.file_error {
        warnings.push(format!("config file ignored: {}", reason));
    }

    if let Some(mirror) = &env.registry_mirror {
        if !mirror.is_file() {
            warnings.push(format!(
                "PLAYGROUND_REGISTRY_MIRROR ({}) is not a readable file",
                mirror.display()
            ));
        }
    }

    if !env.cdn_prefix.starts_with("https://") && !env.cdn_prefix.starts_with("http://") {
        warnings.push(format!("PLAYGROUND_CDN_PREFIX ({}) is not an http(s) URL", env.cdn_prefix));
    }

    if env.runtime_asset.is_empty() || env.runtime_asset.contains('/') {
        warnings.push(format!(
            "PLAYGROUND_RUNTIME_ASSET ({}) must be a bare file name",
            env.runtime_asset
        ));
    }

    if tracing_subscriber::EnvFilter::try_new(&env.log.level).is_err() {
        warnings.push(format!("PLAYGROUND_LOG_LEVEL ({}) is not a valid filter", env.log.level));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("PLAYGROUND_REGISTRY_URL={}", cfg.registry_url);
    println!("PLAYGROUND_REGISTRY_MIRROR={}", cfg.registry_mirror.as_deref().unwrap_or(""));
    println!("PLAYGROUND_CDN_PREFIX={}", cfg.cdn_prefix);
    println!("PLAYGROUND_RUNTIME_ASSET={}", cfg.runtime_asset);
    println!("PLAYGROUND_CATALOG_TTL_MS={}", cfg.catalog_ttl_ms);
    println!("PLAYGROUND_VERDICT_TTL_SECS={}", cfg.verdict_ttl_secs);
    println!("PLAYGROUND_DRAIN_TIMEOUT_MS={}", cfg.drain_timeout_ms);
    println!("PLAYGROUND_STORAGE_DIR={}", cfg.storage_dir);
    println!("PLAYGROUND_LOG_LEVEL={}", cfg.log_level);
    println!("PLAYGROUND_LOG_FORMAT={}", cfg.log_format);
}
