//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use chrono::{DateTime, NaiveDate, Utc};

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::{LabError, Result};

pub mod assign;
pub mod event;
pub mod experiment;
pub mod report;

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Experiment(args) => experiment::run(ctx, args),
        Commands::Assign(args) => assign::run(ctx, args),
        Commands::Event(args) => event::run(ctx, args),
        Commands::Report(args) => report::run(ctx, args),
    }
}

/// Accepts RFC 3339 (`2026-03-01T12:00:00Z`) or a bare date, read as
/// midnight UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            LabError::ValidationFailed(format!(
                "invalid timestamp {raw} (expected RFC 3339 or YYYY-MM-DD)"
            ))
        })
}

/// Split `key=value`, trimming both sides.
pub fn split_pair<'a>(spec: &'a str, what: &str) -> Result<(&'a str, &'a str)> {
    let (key, value) = spec
        .split_once('=')
        .ok_or_else(|| LabError::ValidationFailed(format!("invalid {what}: {spec} (expected key=value)")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(LabError::ValidationFailed(format!("{what} key cannot be empty")));
    }
    Ok((key, value.trim()))
}
