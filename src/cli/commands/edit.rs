//! `credvault edit`: change a secret's fields or password.

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{actor, open_vault, parse_expiry, read_password, Cli};
use crate::errors::Result;
use crate::vault::{SecretInput, SecretKind};

/// Arguments of the `edit` command.  Unset options keep the stored value.
#[derive(Default)]
pub struct EditArgs<'a> {
    pub name: &'a str,
    pub rename: Option<&'a str>,
    pub password: Option<&'a str>,
    pub change_password: bool,
    pub kind: Option<SecretKind>,
    pub connection: Option<&'a str>,
    pub username: Option<&'a str>,
    pub host: Option<&'a str>,
    pub folder: Option<&'a str>,
    pub no_folder: bool,
    pub expires: Option<&'a str>,
    pub no_expiry: bool,
}

/// Execute the `edit` command.
pub fn execute(cli: &Cli, args: EditArgs<'_>) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let actor = actor(cli);

    let secret = vault.find_by_name(&actor, args.name)?;
    let mut input = SecretInput::from_record(&secret);

    if let Some(name) = args.rename {
        input.name = name.to_string();
    }
    if let Some(kind) = args.kind {
        input.kind = kind;
    }
    if let Some(connection) = args.connection {
        input.connection = Some(connection.to_string());
    }
    if let Some(username) = args.username {
        input.username = Some(username.to_string());
    }
    if let Some(host) = args.host {
        input.host = Some(host.to_string());
    }

    if args.no_folder {
        input.folder_id = None;
    } else if let Some(folder) = args.folder {
        input.folder_id = Some(vault.find_folder(&actor, folder)?.id);
    }

    if args.no_expiry {
        input.expires_at = None;
    } else if let Some(expires) = args.expires {
        input.expires_at = Some(parse_expiry(expires)?);
    }

    if let Some(password) = args.password {
        output::warning("Password provided on command line, it may appear in shell history.");
        input.password = Some(Zeroizing::new(password.to_string()));
    } else if args.change_password {
        input.password = Some(read_password(None, &format!("New password for {}", args.name))?);
    }

    let updated = vault.update(&actor, &secret, input)?;
    output::success(&format!("Updated secret '{}'", updated.masked_name()));
    Ok(())
}
