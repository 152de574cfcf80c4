//! Whoami command implementation.

use anyhow::{Context, Result};

use crate::utils::open_state;

/// Execute the whoami command.
///
/// Prints the persisted submitter ID, generating one on first use.
pub fn execute() -> Result<()> {
    let mut state = open_state()?;
    let id = state.submitter_id().context("Failed to write state")?;
    println!("{}", id);
    Ok(())
}
