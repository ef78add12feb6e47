//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "relabel",
    version,
    about = "Declarative label manager for repositories",
    long_about = "relabel — computes the labels a repository and its issues/PRs should carry\nfrom one declarative rule file, and reconciles them with a minimal,\nidempotent operation plan.\n\nAll runs operate on a JSON facts snapshot; pass --write to persist the\nmutated snapshot, otherwise the run is a dry-run.",
    after_help = "Examples:\n  relabel generate --config labels.yaml --snapshot facts.json --target octo/widgets\n  relabel sync --config labels.yaml --snapshot facts.json --target octo/widgets/pull/12 --actions --write\n  relabel purge --config labels.yaml --snapshot facts.json --target octo/widgets --write",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
/// Supported subcommands for previewing, syncing, and purging labels.
pub enum Commands {
    /// Show version
    #[command(about = "Show version", long_about = "Print the current relabel version.")]
    Version,
    /// Preview the labels the rules resolve to
    #[command(
        about = "Compute desired labels without mutating anything",
        long_about = "Compile the rule file, evaluate it against the target's facts, and print\nthe resolved labels and the plan that a sync would execute. Performs no\nmutation.",
        after_help = "Examples:\n  relabel generate --config labels.yaml --snapshot facts.json --target octo/widgets\n  relabel generate --config labels.yaml --snapshot facts.json --target octo/widgets/issue/3 --output json"
    )]
    Generate {
        #[arg(long, help = "Path to the rule file (YAML or JSON)")]
        config: String,
        #[arg(long, help = "Path to the JSON facts snapshot")]
        snapshot: String,
        #[arg(long, help = "Target: owner/repo[/pull/N|/issue/N]")]
        target: String,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
    /// Reconcile labels against the snapshot
    #[command(
        about = "Apply the minimal operation plan",
        long_about = "Diff the desired labels against the snapshot's registry and assignments,\nthen execute creates/updates/assigns/detaches. Close/reopen actions and\ntheir comments only fire with --actions. Running twice against unchanged\nfacts executes nothing the second time.",
        after_help = "Examples:\n  relabel sync --config labels.yaml --snapshot facts.json --target octo/widgets --write\n  relabel sync --config labels.yaml --snapshot facts.json --target octo/widgets/pull/12 --actions"
    )]
    Sync {
        #[arg(long, help = "Path to the rule file (YAML or JSON)")]
        config: String,
        #[arg(long, help = "Path to the JSON facts snapshot")]
        snapshot: String,
        #[arg(long, help = "Target: owner/repo[/pull/N|/issue/N]")]
        target: String,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Execute close/reopen actions and their comments")]
        actions: bool,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Persist the mutated snapshot back to disk")]
        write: bool,
    },
    /// Remove every label the rule file manages
    #[command(
        about = "Detach and delete managed labels",
        long_about = "Detach every managed label from the in-scope items; on whole-repository\ntargets, also delete the managed registry entries. Labels not produced by\nthe rule file are never touched.",
        after_help = "Examples:\n  relabel purge --config labels.yaml --snapshot facts.json --target octo/widgets --write"
    )]
    Purge {
        #[arg(long, help = "Path to the rule file (YAML or JSON)")]
        config: String,
        #[arg(long, help = "Path to the JSON facts snapshot")]
        snapshot: String,
        #[arg(long, help = "Target: owner/repo[/pull/N|/issue/N]")]
        target: String,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Persist the mutated snapshot back to disk")]
        write: bool,
    },
}
