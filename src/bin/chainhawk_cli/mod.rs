//! CLI subcommand implementations for chainhawk

pub mod config;
pub mod fuzz;
pub mod output;
pub mod semgrep;

use anyhow::{anyhow, Result};
use std::path::Path;

/// Reject missing targets before any tool runs.
pub fn ensure_target_exists(target: &Path) -> Result<()> {
    if target.exists() {
        Ok(())
    } else {
        Err(anyhow!("target does not exist: {}", target.display()))
    }
}
