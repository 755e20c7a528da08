//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::audit::{AuditAction, AuditPage};
use crate::vault::{Folder, SecretRecord};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_optional_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(format_time).unwrap_or_else(|| "-".to_string())
}

/// Print a table of secrets (masked names, never passwords).
pub fn print_secrets_table(secrets: &[SecretRecord], folders: &[Folder]) {
    if secrets.is_empty() {
        info("No secrets in this vault yet.");
        tip("Run `credvault add <NAME>` to add your first secret.");
        return;
    }

    let folder_names: HashMap<i64, &str> = folders.iter().map(|f| (f.id, f.name.as_str())).collect();
    let now = Utc::now();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Name", "Type", "Username", "Host", "Folder", "Used", "Last used", "Expires",
    ]);

    for s in secrets {
        let folder = s
            .folder_id
            .and_then(|id| folder_names.get(&id).copied())
            .unwrap_or("-");
        let expires = match s.expires_at {
            Some(_) if s.is_expired(now) => style("expired").red().to_string(),
            other => format_optional_time(other),
        };

        table.add_row(vec![
            s.masked_name(),
            s.kind.to_string(),
            s.username.clone().unwrap_or_else(|| "-".into()),
            s.host.clone().unwrap_or_else(|| "-".into()),
            folder.to_string(),
            s.usage_count.to_string(),
            format_optional_time(s.last_used_at),
            expires,
        ]);
    }

    println!("{table}");
}

/// Print one secret as a two-column detail table.
pub fn print_secret_details(secret: &SecretRecord, folder: Option<&str>) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let rows = [
        ("Name", secret.name.clone()),
        ("Type", secret.kind.to_string()),
        ("Username", secret.username.clone().unwrap_or_else(|| "-".into())),
        ("Host", secret.host.clone().unwrap_or_else(|| "-".into())),
        ("Folder", folder.unwrap_or("-").to_string()),
        ("Used", secret.usage_count.to_string()),
        ("Last used", format_optional_time(secret.last_used_at)),
        ("Expires", format_optional_time(secret.expires_at)),
        ("Created", format_time(secret.created_at)),
        ("Updated", format_time(secret.updated_at)),
    ];
    for (label, value) in rows {
        table.add_row(vec![label.to_string(), value]);
    }

    println!("{table}");
}

/// Print one page of audit entries.
pub fn print_audit_table(page: &AuditPage) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Action", "Secret", "Context", "IP"]);

    for entry in &page.entries {
        let secret = entry
            .secret_name
            .as_deref()
            .map(crate::vault::mask_name)
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            format_time(entry.timestamp),
            colorize_action(entry.action),
            secret,
            entry.context.to_string(),
            entry.ip_address.clone().unwrap_or_else(|| "-".into()),
        ]);
    }

    println!("{table}");
    println!(
        "{}",
        style(format!(
            "Page {} of {} ({} entries)",
            page.page,
            page.total_pages().max(1),
            page.total
        ))
        .dim()
    );
}

/// Colorize action labels for display.
fn colorize_action(action: AuditAction) -> String {
    let label = action.label();
    match action {
        AuditAction::Created => style(label).green().to_string(),
        AuditAction::Updated => style(label).blue().to_string(),
        AuditAction::Deleted | AuditAction::BulkDeleted => style(label).red().to_string(),
        AuditAction::Copied | AuditAction::Viewed => style(label).yellow().to_string(),
        AuditAction::MovedToFolder | AuditAction::RemovedFromFolder => {
            style(label).cyan().to_string()
        }
    }
}
