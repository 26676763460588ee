//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Strata - reversible schema migrations with a reference value and email
/// template catalog
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Override target (database connection); falls back to STRATA_TARGET
    #[arg(short, long, global = true)]
    pub target: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply, roll back and inspect change units
    Migrate(MigrateArgs),
}

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommands,
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommands {
    /// Apply pending change units in id order
    Up(UpArgs),

    /// Roll back applied change units, newest first
    Down(DownArgs),

    /// Show applied and pending change units
    Status(StatusArgs),

    /// Check the ledger and the live schema against the change units
    Verify,

    /// Lint every change unit's inverse list without touching the database
    Check,

    /// Write a new change-unit skeleton
    New(NewArgs),

    /// Remove a stale migration lock
    Unlock(UnlockArgs),
}

/// Arguments for `migrate up`
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Stop after this change unit (inclusive)
    #[arg(long)]
    pub to: Option<String>,
}

/// Arguments for `migrate down`
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Number of applied units to roll back
    #[arg(long, conflicts_with = "to")]
    pub steps: Option<usize>,

    /// Roll back every unit applied after this one (exclusive)
    #[arg(long)]
    pub to: Option<String>,

    /// Also roll back units declared irreversible
    #[arg(long)]
    pub allow_irreversible: bool,
}

/// Arguments for `migrate status`
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Status output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// JSON document
    Json,
}

/// Arguments for `migrate new`
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Short description, turned into the id's slug
    pub slug: String,
}

/// Arguments for `migrate unlock`
#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Required: remove the lock whoever holds it
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
