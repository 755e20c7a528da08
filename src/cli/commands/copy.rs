//! `credvault copy`: put a secret's password on the clipboard.

use crate::cli::output;
use crate::cli::{actor, open_vault, Cli};
use crate::errors::{Result, VaultError};

/// Execute the `copy` command.
pub fn execute(cli: &Cli, name: &str, to_stdout: bool) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let actor = actor(cli);

    let secret = vault.find_by_name(&actor, name)?;
    let (record, password) = vault.copy(&actor, &secret)?;

    if to_stdout {
        println!("{}", password.as_str());
        return Ok(());
    }

    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| VaultError::CommandFailed(format!("clipboard unavailable: {e}")))?;
    clipboard
        .set_text(password.as_str())
        .map_err(|e| VaultError::CommandFailed(format!("clipboard write failed: {e}")))?;

    output::success(&format!(
        "Copied password for '{}' to the clipboard (used {} time(s))",
        record.masked_name(),
        record.usage_count
    ));
    Ok(())
}
