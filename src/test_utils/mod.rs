//! Shared test utilities for splitlab.

pub mod fixtures;
pub mod logging;
