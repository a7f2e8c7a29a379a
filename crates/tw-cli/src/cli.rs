//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::check::CheckArgs;

/// Toggl billable-change watcher.
///
/// Caches recent Toggl time entries locally and reports entries whose
/// billable flag changed since the previous check.
#[derive(Debug, Parser)]
#[command(name = "tw", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch recent entries, report billable changes and prune old ones.
    #[command(alias = "checkEntries")]
    Check(CheckArgs),

    /// Show what the local cache holds.
    Status,
}
