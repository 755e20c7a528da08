//! `credvault add`: store a new secret.

use crate::cli::output;
use crate::cli::{actor, open_vault, parse_expiry, read_password, Cli};
use crate::errors::Result;
use crate::vault::{SecretInput, SecretKind};

/// Arguments of the `add` command.
pub struct AddArgs<'a> {
    pub name: &'a str,
    pub password: Option<&'a str>,
    pub ssh: bool,
    pub connection: Option<&'a str>,
    pub username: Option<&'a str>,
    pub host: Option<&'a str>,
    pub folder: Option<&'a str>,
    pub expires: Option<&'a str>,
}

/// Execute the `add` command.
pub fn execute(cli: &Cli, args: AddArgs<'_>) -> Result<()> {
    let mut vault = open_vault(cli)?;
    let actor = actor(cli);

    let folder_id = match args.folder {
        Some(name) => Some(vault.find_folder(&actor, name)?.id),
        None => None,
    };
    let expires_at = args.expires.map(parse_expiry).transpose()?;
    let password = read_password(args.password, &format!("Password for {}", args.name))?;

    let input = SecretInput {
        name: args.name.to_string(),
        kind: if args.ssh {
            SecretKind::Ssh
        } else {
            SecretKind::Normal
        },
        username: args.username.map(str::to_string),
        host: args.host.map(str::to_string),
        connection: args.connection.map(str::to_string),
        password: Some(password),
        expires_at,
        folder_id,
    };

    let record = vault.create(&actor, input)?;

    output::success(&format!("Added {} secret '{}'", record.kind, record.masked_name()));
    if let (Some(user), Some(host)) = (&record.username, &record.host) {
        output::tip(&format!("{user}@{host}"));
    }
    Ok(())
}
