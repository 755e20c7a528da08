//! `credvault rotate`: re-wrap every secret under the current master key.
//!
//! All master key versions still referenced by stored secrets must be
//! configured; the old ones can be retired once this has run.

use crate::cli::output;
use crate::cli::{actor, open_vault, Cli};
use crate::errors::Result;

/// Execute the `rotate` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let summary = vault.rotate_keys(&actor(cli))?;

    if summary.rotated == 0 {
        output::info(&format!(
            "All secrets already use key version {}.",
            summary.to_version
        ));
        return Ok(());
    }

    output::success(&format!(
        "Re-encrypted {} secret(s) under key version {} ({} unchanged)",
        summary.rotated, summary.to_version, summary.unchanged
    ));
    output::tip("Older key versions can be removed once no other vault uses them.");
    Ok(())
}
