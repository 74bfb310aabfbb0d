//! splitlab: idempotent A/B variant assignment and per-variant conversion
//! analytics over an append-only event log.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod service;
pub mod storage;
pub mod test_utils;

pub use error::{LabError, Result};
pub use service::ExperimentService;

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
