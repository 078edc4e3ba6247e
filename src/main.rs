// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Playground CLI entry point.
//!
//! Offline maintenance of the compiler version catalog and verdict store.
//!
//! ## CLI Subcommands
//!
//! - `playground-cli versions` - List compiler versions from the registry mirror
//! - `playground-cli verdict <version>` - Show a stored compatibility verdict
//! - `playground-cli last-used` - Print the last-used compiler version
//! - `playground-cli forget <version>` - Delete a stored verdict
//! - `playground-cli config show|defaults|validate` - Inspect configuration

use std::process::ExitCode;

use playground_core::cli::{self, config_cmd, VersionsArgs};
use playground_core::config as playground_config;
use playground_core::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    let config = playground_config::load();
    if let Err(e) = telemetry::init_logging(&config.log) {
        eprintln!("Logging disabled: {}", e);
    }

    match command {
        "versions" => match VersionsArgs::parse(&args[2..]) {
            Ok(parsed) => exit(cli::run_versions(&config, parsed).await),
            Err(e) => {
                eprintln!("{}", e);
                print_command_help("versions");
                exit(cli::EXIT_CONFIG)
            }
        },
        "verdict" | "forget" => {
            let Some(version) = args.get(2) else {
                eprintln!("Missing version argument");
                print_command_help(command);
                return exit(cli::EXIT_CONFIG);
            };
            if command == "verdict" {
                exit(cli::run_verdict(&config, version))
            } else {
                exit(cli::run_forget(&config, version))
            }
        }
        "last-used" => exit(cli::run_last_used(&config)),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("playground-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "playground-cli - compiler playground maintenance v{}

USAGE:
    playground-cli [COMMAND] [OPTIONS]

COMMANDS:
    versions     List compiler versions from the registry mirror
    verdict      Show the stored compatibility verdict for a version
    last-used    Print the last-used compiler version
    forget       Delete the stored verdict for a version
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    playground-cli versions --preview --all
    playground-cli verdict 2.0.9
    playground-cli config validate

ENVIRONMENT:
    PLAYGROUND_CONFIG           TOML file with defaults beneath the environment
    PLAYGROUND_REGISTRY_MIRROR  Mirrored registry metadata document
    PLAYGROUND_STORAGE_DIR      Verdict store directory (default: .playground)
    PLAYGROUND_LOG_LEVEL        Log filter (default: info)

EXIT CODES:
    0  Success
    1  Failure / not found
    2  Configuration error
    3  Mirror or store unavailable
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "versions" => eprintln!(
            "playground-cli versions - List compiler versions

USAGE:
    playground-cli versions [--preview|--production] [--refresh] [--all]

OPTIONS:
    --preview     List preview builds (0.0.0-*)
    --production  List production releases (default)
    --refresh     Bypass the catalog cache
    --all         List every version instead of the initial page

DESCRIPTION:
    Reads the registry document named by PLAYGROUND_REGISTRY_MIRROR and
    marks each version with its stored verdict. The last-used version is
    marked with '*'.
"
        ),
        "verdict" => eprintln!(
            "playground-cli verdict - Show a stored verdict

USAGE:
    playground-cli verdict <VERSION>

DESCRIPTION:
    Prints the per-capability verdict and its expiry. Expired records are
    purged and reported as absent.

EXIT CODES:
    0  Verdict found
    1  No live verdict
"
        ),
        "forget" => eprintln!(
            "playground-cli forget - Delete a stored verdict

USAGE:
    playground-cli forget <VERSION>

DESCRIPTION:
    The next switch to VERSION will probe it again.
"
        ),
        "last-used" => eprintln!(
            "playground-cli last-used - Print the last-used compiler version

USAGE:
    playground-cli last-used
"
        ),
        "config" => eprintln!(
            "playground-cli config - Inspect configuration

USAGE:
    playground-cli config [show|defaults|validate]

SUBCOMMANDS:
    show      Effective values after environment and config file
    defaults  Built-in defaults
    validate  Check for misconfiguration (exit 1 on warnings)
"
        ),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }
}
