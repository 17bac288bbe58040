//! Command orchestration.
//!
//! Each entry point loads its inputs, runs the pipeline stages in order and
//! prints the outcome. Domain failures travel as values to the report; only
//! unreadable inputs and bad configuration return errors.
mod chains;
mod sync;

pub use chains::run_chains;
pub use sync::run_sync;

use crate::cli::ConfigArgs;
use crate::config::config_stub;
use anyhow::Result;

/// Print the default configuration.
pub fn run_config(_args: &ConfigArgs) -> Result<()> {
    print!("{}", config_stub()?);
    Ok(())
}
