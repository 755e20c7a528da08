//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use zeroize::Zeroizing;

use crate::audit::{Actor, Origin};
use crate::config::Settings;
use crate::errors::{Result, VaultError};
use crate::vault::store::storable_year;
use crate::vault::{SecretRecord, Vault};

/// credvault CLI: personal credential vault with an audit trail.
#[derive(Parser)]
#[command(
    name = "credvault",
    about = "Personal credential vault with envelope encryption and an audit trail",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Account id to act as
    #[arg(long, env = "CREDVAULT_OWNER", default_value_t = 1, global = true)]
    pub owner: i64,

    /// Config file (default: ./.credvault.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a new base64 master key
    Keygen {
        /// Key version the new key is meant for
        #[arg(long, default_value_t = 1)]
        key_version: u32,
    },

    /// Add a secret
    Add {
        /// Secret name
        name: String,
        /// Password (omit for piped input or interactive prompt)
        #[arg(long)]
        password: Option<String>,
        /// Store SSH credentials instead of a plain password
        #[arg(long)]
        ssh: bool,
        /// SSH connection string, e.g. "ssh admin@203.0.113.5"
        #[arg(long)]
        connection: Option<String>,
        /// Username
        #[arg(short, long)]
        username: Option<String>,
        /// Host (ssh) or url (normal)
        #[arg(long)]
        host: Option<String>,
        /// Folder name
        #[arg(long)]
        folder: Option<String>,
        /// Expiry date (YYYY-MM-DD, UTC)
        #[arg(long)]
        expires: Option<String>,
    },

    /// Change a secret
    Edit {
        /// Secret name
        name: String,
        /// New name
        #[arg(long)]
        rename: Option<String>,
        /// New password
        #[arg(long)]
        password: Option<String>,
        /// Prompt for a new password
        #[arg(long, conflicts_with = "password")]
        change_password: bool,
        /// Switch the secret type to ssh
        #[arg(long, conflicts_with = "normal")]
        ssh: bool,
        /// Switch the secret type to normal
        #[arg(long)]
        normal: bool,
        /// SSH connection string
        #[arg(long)]
        connection: Option<String>,
        /// Username
        #[arg(short, long)]
        username: Option<String>,
        /// Host (ssh) or url (normal)
        #[arg(long)]
        host: Option<String>,
        /// Folder name
        #[arg(long, conflicts_with = "no_folder")]
        folder: Option<String>,
        /// Take the secret out of its folder
        #[arg(long)]
        no_folder: bool,
        /// Expiry date (YYYY-MM-DD, UTC)
        #[arg(long, conflicts_with = "no_expiry")]
        expires: Option<String>,
        /// Clear the expiry date
        #[arg(long)]
        no_expiry: bool,
    },

    /// List all secrets
    List,

    /// Show a secret's details
    Show {
        /// Secret name
        name: String,
        /// Also print the password (recorded as viewed)
        #[arg(long)]
        reveal: bool,
    },

    /// Copy a secret's password to the clipboard
    Copy {
        /// Secret name
        name: String,
        /// Print to stdout instead of the clipboard
        #[arg(long)]
        stdout: bool,
    },

    /// Delete one or more secrets
    Delete {
        /// Secret names; more than one deletes them as a batch
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Move secrets into a folder
    Move {
        /// Destination folder name
        #[arg(long)]
        folder: String,
        /// Secret names
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// Take secrets out of their folder
    Unfile {
        /// Secret names
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// Manage folders
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Re-encrypt every secret under the current master key
    Rotate,

    /// Browse the audit log
    Audit {
        /// Only this action (see `credvault actions`)
        #[arg(long)]
        action: Option<String>,
        /// Only entries for this secret
        #[arg(long)]
        secret: Option<String>,
        /// Free-text search over action, context, ip and secret name
        #[arg(long)]
        search: Option<String>,
        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Entries per page (max 100)
        #[arg(long, default_value_t = crate::audit::DEFAULT_PER_PAGE)]
        per_page: u32,
        /// Oldest entries first
        #[arg(long)]
        oldest_first: bool,
    },

    /// List the audit actions that can be filtered on
    Actions,
}

/// Folder subcommands.
#[derive(clap::Subcommand)]
pub enum FolderAction {
    /// Create a folder
    Add {
        /// Folder name
        name: String,
    },

    /// List folders
    List,
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// The acting user.  Every CLI invocation is labelled `cli` in the audit log.
pub fn actor(cli: &Cli) -> Actor {
    Actor::new(cli.owner, Origin::cli())
}

/// Load settings from `--config` or `./.credvault.toml`, then apply
/// environment overrides.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_file(path)?,
        None => Settings::load(&std::env::current_dir()?)?,
    };
    settings.apply_env()?;
    Ok(settings)
}

/// Open the vault described by the settings.
///
/// A relative database path resolves against the directory holding the
/// config file, or the working directory when there is none.
pub fn open_vault(cli: &Cli) -> Result<Vault> {
    let settings = load_settings(cli)?;
    let keys = settings.key_ring()?;

    let base = match cli.config.as_deref().and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    Vault::open(&settings.database_path(&base), keys)
}

/// Look up several secrets by name, failing on the first unknown one.
pub fn resolve_names(vault: &Vault, actor: &Actor, names: &[String]) -> Result<Vec<SecretRecord>> {
    names
        .iter()
        .map(|name| vault.find_by_name(actor, name))
        .collect()
}

/// Get a password from one of three sources: the command line, piped
/// stdin, or an interactive prompt.
pub fn read_password(inline: Option<&str>, prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(v) = inline {
        output::warning("Password provided on command line, it may appear in shell history.");
        return Ok(Zeroizing::new(v.to_string()));
    }

    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim_end().to_string();
        return Ok(Zeroizing::new(trimmed));
    }

    let pw = dialoguer::Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()
        .map_err(|e| VaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .ok()
        .filter(|date| storable_year(date.year()))
        .ok_or_else(|| {
            VaultError::CommandFailed(format!("invalid date '{input}', expected YYYY-MM-DD"))
        })
}

/// Parse an expiry date; the secret expires at the start of that day (UTC).
pub fn parse_expiry(input: &str) -> Result<DateTime<Utc>> {
    Ok(parse_date(input)?.and_time(NaiveTime::MIN).and_utc())
}
