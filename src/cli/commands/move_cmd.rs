//! `credvault move`: file secrets into a folder.

use crate::cli::output;
use crate::cli::{actor, open_vault, resolve_names, Cli};
use crate::errors::Result;

/// Execute the `move` command.
pub fn execute(cli: &Cli, folder: &str, names: &[String]) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let actor = actor(cli);

    let folder = vault.find_folder(&actor, folder)?;
    let ids: Vec<i64> = resolve_names(&vault, &actor, names)?
        .iter()
        .map(|s| s.id)
        .collect();

    let moved = vault.move_to_folder(&actor, &ids, Some(folder.id))?;
    output::success(&format!("Moved {} secret(s) to '{}'", moved.len(), folder.name));
    Ok(())
}
