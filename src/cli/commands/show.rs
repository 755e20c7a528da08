//! `credvault show`: print a secret's details, optionally its password.

use console::style;

use crate::cli::output;
use crate::cli::{actor, open_vault, Cli};
use crate::errors::Result;

/// Execute the `show` command.
pub fn execute(cli: &Cli, name: &str, reveal: bool) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let actor = actor(cli);

    let secret = vault.find_by_name(&actor, name)?;
    let folder = match secret.folder_id {
        Some(id) => vault
            .list_folders(&actor)?
            .into_iter()
            .find(|f| f.id == id)
            .map(|f| f.name),
        None => None,
    };

    output::print_secret_details(&secret, folder.as_deref());

    if secret.is_expired(chrono::Utc::now()) {
        output::warning("This secret has expired.");
    }

    if reveal {
        let password = vault.reveal(&actor, &secret)?;
        println!("{} {}", style("Password:").bold(), password.as_str());
    }

    Ok(())
}
