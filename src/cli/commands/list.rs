//! `credvault list`: display all secrets in a table.

use crate::cli::output;
use crate::cli::{actor, open_vault, Cli};
use crate::errors::Result;

/// Execute the `list` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let vault = open_vault(cli)?;
    let actor = actor(cli);

    let secrets = vault.list(&actor)?;
    let folders = vault.list_folders(&actor)?;

    output::info(&format!("{} secret(s)", secrets.len()));
    output::print_secrets_table(&secrets, &folders);

    Ok(())
}
