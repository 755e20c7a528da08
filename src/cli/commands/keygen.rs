//! `credvault keygen`: print a fresh master key for provisioning.

use crate::cli::output;
use crate::config::settings::MASTER_KEY_ENV_PREFIX;
use crate::crypto::generate_master_key;
use crate::errors::Result;

/// Execute the `keygen` command.
///
/// The key goes to stdout only; it is never written to disk.
pub fn execute(key_version: u32) -> Result<()> {
    let key = generate_master_key();
    println!("{MASTER_KEY_ENV_PREFIX}{key_version}={}", key.as_str());

    output::tip(&format!(
        "Store it with your secrets manager and export it before running credvault, \
         or add it under [master_keys] as \"{key_version}\"."
    ));
    Ok(())
}
