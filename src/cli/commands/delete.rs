//! `credvault delete`: remove one secret, or several as a batch.

use dialoguer::Confirm;

use crate::cli::output;
use crate::cli::{actor, open_vault, resolve_names, Cli};
use crate::errors::{Result, VaultError};

/// Execute the `delete` command.
pub fn execute(cli: &Cli, names: &[String], force: bool) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let actor = actor(cli);

    let secrets = resolve_names(&vault, &actor, names)?;

    // Unless --force is set, ask for confirmation before deleting.
    if !force {
        let prompt = match secrets.as_slice() {
            [one] => format!("Delete secret '{}'?", one.masked_name()),
            many => format!("Delete {} secrets?", many.len()),
        };
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| VaultError::CommandFailed(format!("confirm prompt: {e}")))?;

        if !confirmed {
            output::info("Cancelled.");
            return Ok(());
        }
    }

    if let [one] = secrets.as_slice() {
        vault.delete(&actor, one)?;
        output::success(&format!("Deleted secret '{}'", one.masked_name()));
    } else {
        let ids: Vec<i64> = secrets.iter().map(|s| s.id).collect();
        let count = vault.destroy_bulk(&actor, &ids)?;
        output::success(&format!("Deleted {count} secrets"));
    }

    Ok(())
}
