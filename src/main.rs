use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use credvault::cli::commands;
use credvault::cli::commands::add::AddArgs;
use credvault::cli::commands::audit_cmd::AuditArgs;
use credvault::cli::commands::edit::EditArgs;
use credvault::cli::{output, Cli, Commands, FolderAction};
use credvault::errors::VaultError;
use credvault::vault::SecretKind;

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("CREDVAULT_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("credvault=debug")
        } else {
            EnvFilter::new("credvault=warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Commands::Keygen { key_version } => commands::keygen::execute(key_version),
        Commands::Add {
            ref name,
            ref password,
            ssh,
            ref connection,
            ref username,
            ref host,
            ref folder,
            ref expires,
        } => commands::add::execute(
            &cli,
            AddArgs {
                name,
                password: password.as_deref(),
                ssh,
                connection: connection.as_deref(),
                username: username.as_deref(),
                host: host.as_deref(),
                folder: folder.as_deref(),
                expires: expires.as_deref(),
            },
        ),
        Commands::Edit {
            ref name,
            ref rename,
            ref password,
            change_password,
            ssh,
            normal,
            ref connection,
            ref username,
            ref host,
            ref folder,
            no_folder,
            ref expires,
            no_expiry,
        } => commands::edit::execute(
            &cli,
            EditArgs {
                name,
                rename: rename.as_deref(),
                password: password.as_deref(),
                change_password,
                kind: match (ssh, normal) {
                    (true, _) => Some(SecretKind::Ssh),
                    (_, true) => Some(SecretKind::Normal),
                    _ => None,
                },
                connection: connection.as_deref(),
                username: username.as_deref(),
                host: host.as_deref(),
                folder: folder.as_deref(),
                no_folder,
                expires: expires.as_deref(),
                no_expiry,
            },
        ),
        Commands::List => commands::list::execute(&cli),
        Commands::Show { ref name, reveal } => commands::show::execute(&cli, name, reveal),
        Commands::Copy { ref name, stdout } => commands::copy::execute(&cli, name, stdout),
        Commands::Delete { ref names, force } => commands::delete::execute(&cli, names, force),
        Commands::Move {
            ref folder,
            ref names,
        } => commands::move_cmd::execute(&cli, folder, names),
        Commands::Unfile { ref names } => commands::unfile::execute(&cli, names),
        Commands::Folder { ref action } => match action {
            FolderAction::Add { name } => commands::folder::execute_add(&cli, name),
            FolderAction::List => commands::folder::execute_list(&cli),
        },
        Commands::Rotate => commands::rotate::execute(&cli),
        Commands::Audit {
            ref action,
            ref secret,
            ref search,
            ref from,
            ref to,
            page,
            per_page,
            oldest_first,
        } => commands::audit_cmd::execute(
            &cli,
            AuditArgs {
                action: action.as_deref(),
                secret: secret.as_deref(),
                search: search.as_deref(),
                from: from.as_deref(),
                to: to.as_deref(),
                page,
                per_page,
                oldest_first,
            },
        ),
        Commands::Actions => commands::actions::execute(),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        let hint = match &e {
            VaultError::Configuration(_) => {
                Some("run: credvault keygen, then export CREDVAULT_MASTER_KEY_1")
            }
            VaultError::Conflict(_) => Some("run the command again to pick up the latest version"),
            _ => None,
        };
        if let Some(hint) = hint {
            output::tip(hint);
        }
        std::process::exit(1);
    }
}
