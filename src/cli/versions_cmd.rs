// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Versions CLI subcommand: list the compiler catalog.
//!
//! Reads the mirrored registry document and marks each version with its
//! stored compatibility verdict, if any.

use crate::cli::{open_catalog, open_store, CliError};
use crate::config::EnvConfig;
use crate::storage::{CompatibilityStore, VerdictLookup};
use crate::versions::{VersionId, VersionsType, VersionsView};

/// Parsed `versions` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionsArgs {
    pub versions_type: VersionsType,
    pub refresh: bool,
    pub all: bool,
}

impl VersionsArgs {
    /// Parse flags following `versions`. Unknown flags are rejected.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Self::default();
        for arg in args {
            match arg.as_str() {
                "--preview" => parsed.versions_type = VersionsType::Preview,
                "--production" => parsed.versions_type = VersionsType::Production,
                "--refresh" => parsed.refresh = true,
                "--all" => parsed.all = true,
                other => return Err(format!("Unknown versions option: {}", other)),
            }
        }
        Ok(parsed)
    }
}

/// Run `versions`.
///
/// Returns exit code: 0 on success, 2 without a mirror, 3 if the mirror or store is unreadable.
pub async fn run_versions(config: &EnvConfig, args: VersionsArgs) -> i32 {
    match list_versions(config, args).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

async fn list_versions(config: &EnvConfig, args: VersionsArgs) -> Result<Vec<String>, CliError> {
    let catalog = open_catalog(config)?;
    let store = open_store(config)?;
    let partition = catalog.partitioned(args.refresh).await?;

    let mut view = VersionsView::new(partition);
    view.select(args.versions_type);
    let last_used = store.last_used_version();

    let mut lines = render_versions(&view, args.all, &store, last_used.as_ref());
    if !args.all && view.has_more() {
        lines.push("(more available, pass --all)".to_string());
    }
    Ok(lines)
}

fn render_versions(
    view: &VersionsView,
    all: bool,
    store: &CompatibilityStore,
    last_used: Option<&VersionId>,
) -> Vec<String> {
    let versions: &[VersionId] = if all {
        match view.versions_type() {
            VersionsType::Production => &view.partition().production_versions,
            VersionsType::Preview => &view.partition().preview_versions,
        }
    } else {
        view.visible()
    };

    versions
        .iter()
        .map(|version| {
            let verdict = match store.get_verdict(version) {
                VerdictLookup::Unknown => "unverified",
                VerdictLookup::Verified(record) if record.compatibility_map.is_fit() => "compatible",
                VerdictLookup::Verified(_) => "incompatible",
            };
            let marker = if last_used == Some(version) { "*" } else { " " };
            format!("{} {:<32} {}", marker, version, verdict)
        })
        .collect()
}
