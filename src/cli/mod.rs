//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// splitlab - idempotent A/B assignment and per-variant conversion analytics
#[derive(Parser, Debug)]
#[command(name = "splitlab")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit JSON on stdout for scripts and agents
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/splitlab/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, inspect and update experiments
    Experiment(commands::experiment::ExperimentArgs),

    /// Resolve a user's variant, assigning one on first sight
    Assign(commands::assign::AssignArgs),

    /// Record behavioural events
    Event(commands::event::EventArgs),

    /// Per-variant conversion and revenue report
    Report(commands::report::ReportArgs),
}
