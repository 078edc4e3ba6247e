// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Store CLI subcommands: verdict, last-used, forget.

use crate::cli::open_store;
use crate::config::EnvConfig;
use crate::storage::{StoredCompatibilityRecord, VerdictLookup};
use crate::versions::VersionId;

/// Run `verdict <version>`.
///
/// Returns exit code: 0 if a live verdict exists, 1 if none, 3 if the store is unavailable.
pub fn run_verdict(config: &EnvConfig, version: &str) -> i32 {
    let store = match open_store(config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };

    match store.get_verdict(&VersionId::from(version)) {
        VerdictLookup::Verified(record) => {
            print_record(&record);
            0
        }
        VerdictLookup::Unknown => {
            println!("No stored verdict for {}.", version);
            1
        }
    }
}

/// Run `last-used`. Exit code 1 if no version has been used yet.
pub fn run_last_used(config: &EnvConfig) -> i32 {
    match open_store(config) {
        Ok(store) => match store.last_used_version() {
            Some(version) => {
                println!("{}", version);
                0
            }
            None => {
                println!("No compiler version used yet.");
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

/// Run `forget <version>`.
pub fn run_forget(config: &EnvConfig, version: &str) -> i32 {
    match open_store(config) {
        Ok(store) => {
            store.forget(&VersionId::from(version));
            println!("Forgot verdict for {}.", version);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn print_record(record: &StoredCompatibilityRecord) {
    println!("version: {}", record.version);
    println!("expires: {}", record.expires.to_rfc3339());
    for (capability, status) in record.compatibility_map.iter() {
        println!("  {:<26} {:?}", capability.as_str(), status);
    }
}
