//! `credvault unfile`: take secrets out of their folder.

use crate::cli::output;
use crate::cli::{actor, open_vault, resolve_names, Cli};
use crate::errors::Result;

/// Execute the `unfile` command.
pub fn execute(cli: &Cli, names: &[String]) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let actor = actor(cli);

    let ids: Vec<i64> = resolve_names(&vault, &actor, names)?
        .iter()
        .map(|s| s.id)
        .collect();

    let removed = vault.remove_from_folder(&actor, &ids)?;
    output::success(&format!("Removed {} secret(s) from their folder", removed.len()));
    Ok(())
}
