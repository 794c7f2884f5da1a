//! Clap derive structures for the `nvrlink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nvrlink -- relay NVR alarm streams to a motion webhook
#[derive(Debug, Parser)]
#[command(
    name = "nvrlink",
    version,
    about = "Relay NVR alarm events to a motion webhook",
    long_about = "Keeps one Digest-authenticated event stream open per NVR host,\n\
        reconnecting on a fixed delay, and forwards motion alarms for each\n\
        configured camera to an HTTP motion endpoint.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the config file
    #[arg(long, env = "NVRLINK_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Seconds to wait before reconnecting (overrides config)
    #[arg(long, global = true, value_name = "SECS")]
    pub reconnect_delay: Option<u64>,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to every configured NVR and relay alarms until Ctrl-C
    Run,

    /// Show the connection targets built from the config
    Targets,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
