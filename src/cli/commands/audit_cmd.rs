//! `credvault audit`: browse the audit log.
//!
//! Usage:
//!   credvault audit                          # newest 25 entries
//!   credvault audit --action copied          # only copies
//!   credvault audit --from 2026-01-01 --to 2026-01-31 --page 2

use crate::audit::{AuditFilter, SortOrder};
use crate::cli::output;
use crate::cli::{actor, open_vault, parse_date, Cli};
use crate::errors::Result;

/// Filters of the `audit` command, as typed on the command line.
#[derive(Debug, Default)]
pub struct AuditArgs<'a> {
    pub action: Option<&'a str>,
    pub secret: Option<&'a str>,
    pub search: Option<&'a str>,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub page: u32,
    pub per_page: u32,
    pub oldest_first: bool,
}

/// Execute the `audit` command.
pub fn execute(cli: &Cli, args: AuditArgs<'_>) -> Result<()> {
    let vault = open_vault(cli)?;
    let actor = actor(cli);

    let secret_id = match args.secret {
        Some(name) => Some(vault.find_by_name(&actor, name)?.id),
        None => None,
    };

    let filter = AuditFilter {
        action: args.action.map(str::parse).transpose()?,
        secret_id,
        search: args.search.map(str::to_string),
        from: args.from.map(parse_date).transpose()?,
        to: args.to.map(parse_date).transpose()?,
        order: if args.oldest_first {
            SortOrder::OldestFirst
        } else {
            SortOrder::NewestFirst
        },
        page: args.page,
        per_page: args.per_page,
    };

    let page = vault.audit(&actor, &filter)?;
    if page.entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    output::print_audit_table(&page);
    Ok(())
}
