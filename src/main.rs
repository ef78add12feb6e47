//! relabel CLI binary entry point.
//! Parses arguments, wires up the snapshot provider, and prints run reports.

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use relabel::cli::{Cli, Commands};
use relabel::provider::{RepoProvider, SnapshotProvider};
use relabel::sync::RunMode;
use relabel::{config, output, sync};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Generate {
            config,
            snapshot,
            target,
            output,
        } => run_command(
            &config,
            &snapshot,
            &target,
            output.as_deref(),
            RunMode::Generate,
            false,
            false,
        ),
        Commands::Sync {
            config,
            snapshot,
            target,
            output,
            actions,
            write,
        } => run_command(
            &config,
            &snapshot,
            &target,
            output.as_deref(),
            RunMode::Sync,
            actions,
            write,
        ),
        Commands::Purge {
            config,
            snapshot,
            target,
            output,
            write,
        } => run_command(
            &config,
            &snapshot,
            &target,
            output.as_deref(),
            RunMode::Purge,
            false,
            write,
        ),
    }
}

/// Shared generate/sync/purge flow. Configuration problems exit 2 before
/// anything is touched; run failures exit 1 after the report is printed.
fn run_command(
    config_path: &str,
    snapshot_path: &str,
    target: &str,
    output: Option<&str>,
    mode: RunMode,
    actions: bool,
    write: bool,
) {
    let defs = match config::load_definitions(Path::new(config_path)) {
        Ok(defs) => defs,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    let spec = match config::parse_target(target) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    let provider = match SnapshotProvider::load(Path::new(snapshot_path)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    // Friendly note when the snapshot clearly belongs to another repository.
    if let Ok(repo) = provider.fetch_repository() {
        if !repo.full_name.is_empty() && repo.full_name != spec.repo {
            eprintln!(
                "note: snapshot describes '{}', target says '{}'",
                repo.full_name, spec.repo
            );
        }
    }

    let out = output.unwrap_or("human");
    match sync::run(&defs, &provider, mode, spec.scope, actions, chrono::Utc::now()) {
        Ok(report) => {
            let executed = mode != RunMode::Generate;
            output::print_report(&report, out, executed);
            if write && executed {
                if let Err(e) = provider.persist() {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
            if !report.ok() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
