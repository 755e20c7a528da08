//! Audit trail: append-only SQLite history of every secret lifecycle event.
//!
//! Entries are written through the caller's connection, which is always
//! the open transaction of the vault mutation they describe.  A failed
//! write therefore rolls the mutation back with it: no secret changes
//! without its audit row.
//!
//! Rows are never updated or deleted.  Triggers installed by `SCHEMA`
//! reject both, and `secret_id` is a plain integer rather than a foreign
//! key so history survives the deletion of the secret it describes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, ValidationErrors, VaultError};
use crate::vault::store::{
    format_timestamp, is_storable, now, parse_timestamp, storable_year,
};

/// Table, indexes and append-only triggers for the audit log.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    secret_id   INTEGER,
    actor_id    INTEGER NOT NULL,
    action      TEXT NOT NULL,
    context     TEXT NOT NULL,
    ip_address  TEXT,
    metadata    TEXT,
    timestamp   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_actor_time ON audit_log (actor_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_secret ON audit_log (secret_id);
CREATE TRIGGER IF NOT EXISTS audit_log_no_update
    BEFORE UPDATE ON audit_log
    BEGIN SELECT RAISE(ABORT, 'audit log is append-only'); END;
CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
    BEFORE DELETE ON audit_log
    BEGIN SELECT RAISE(ABORT, 'audit log is append-only'); END;
";

/// Default page size for `query`.
pub const DEFAULT_PER_PAGE: u32 = 25;

/// Largest page size `query` will honour.
pub const MAX_PER_PAGE: u32 = 100;

// ---------------------------------------------------------------------------
// Actions and contexts
// ---------------------------------------------------------------------------

/// Every recognised lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Copied,
    Viewed,
    BulkDeleted,
    MovedToFolder,
    RemovedFromFolder,
}

impl AuditAction {
    /// All actions, in display order, for building filter choices.
    pub const ALL: [AuditAction; 8] = [
        AuditAction::Created,
        AuditAction::Updated,
        AuditAction::Deleted,
        AuditAction::Copied,
        AuditAction::Viewed,
        AuditAction::BulkDeleted,
        AuditAction::MovedToFolder,
        AuditAction::RemovedFromFolder,
    ];

    /// Stored identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
            AuditAction::Copied => "copied",
            AuditAction::Viewed => "viewed",
            AuditAction::BulkDeleted => "bulk_deleted",
            AuditAction::MovedToFolder => "moved_to_folder",
            AuditAction::RemovedFromFolder => "removed_from_folder",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            AuditAction::Created => "Created",
            AuditAction::Updated => "Updated",
            AuditAction::Deleted => "Deleted",
            AuditAction::Copied => "Copied",
            AuditAction::Viewed => "Viewed",
            AuditAction::BulkDeleted => "Bulk deleted",
            AuditAction::MovedToFolder => "Moved to folder",
            AuditAction::RemovedFromFolder => "Removed from folder",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| VaultError::CommandFailed(format!("unknown audit action '{s}'")))
    }
}

/// Where an operation was invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditContext {
    Web,
    Api,
    Cli,
    System,
}

impl AuditContext {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditContext::Web => "web",
            AuditContext::Api => "api",
            AuditContext::Cli => "cli",
            AuditContext::System => "system",
        }
    }
}

impl fmt::Display for AuditContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditContext {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "web" => Ok(AuditContext::Web),
            "api" => Ok(AuditContext::Api),
            "cli" => Ok(AuditContext::Cli),
            "system" => Ok(AuditContext::System),
            _ => Err(VaultError::CommandFailed(format!(
                "unknown audit context '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Who and where
// ---------------------------------------------------------------------------

/// The inbound request an operation is serving, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Request path, e.g. `/api/secrets/4`.
    pub path: String,
    pub ip: Option<String>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, ip: Option<String>) -> Self {
        Self {
            path: path.into(),
            ip,
        }
    }

    fn is_api(&self) -> bool {
        let path = self.path.trim_start_matches('/');
        path == "api" || path.starts_with("api/")
    }
}

/// Execution circumstances used to label audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// Caller-chosen context; wins over inference.
    pub explicit: Option<AuditContext>,
    pub request: Option<RequestContext>,
    /// Running from a terminal, batch job or other non-request process.
    pub headless: bool,
}

impl Origin {
    /// Background work with no request and no terminal.
    pub fn system() -> Self {
        Self::default()
    }

    /// A command-line invocation.
    pub fn cli() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }

    /// Serving an HTTP request.
    pub fn request(request: RequestContext) -> Self {
        Self {
            request: Some(request),
            ..Self::default()
        }
    }

    /// Force a specific context regardless of inference.
    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.explicit = Some(context);
        self
    }

    /// Explicit value, else api-prefixed request, else headless, else
    /// no request at all, else web.
    pub fn resolve_context(&self) -> AuditContext {
        if let Some(explicit) = self.explicit {
            return explicit;
        }
        match &self.request {
            Some(req) if req.is_api() => AuditContext::Api,
            _ if self.headless => AuditContext::Cli,
            None => AuditContext::System,
            Some(_) => AuditContext::Web,
        }
    }

    pub fn ip(&self) -> Option<&str> {
        self.request.as_ref().and_then(|r| r.ip.as_deref())
    }
}

/// The user performing an operation and how they reached the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub origin: Origin,
}

impl Actor {
    pub fn new(id: i64, origin: Origin) -> Self {
        Self { id, origin }
    }

    pub fn context(&self) -> AuditContext {
        self.origin.resolve_context()
    }

    pub fn ip(&self) -> Option<&str> {
        self.origin.ip()
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    /// Historical reference; the secret may no longer exist.
    pub secret_id: Option<i64>,
    pub actor_id: i64,
    pub action: AuditAction,
    pub context: AuditContext,
    pub ip_address: Option<String>,
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
    /// Current name of the secret, or the name recorded when it was deleted.
    pub secret_name: Option<String>,
}

/// Record one event.  Runs on the caller's connection (normally the
/// mutation's transaction); an error here must abort that mutation.
pub fn record(
    conn: &Connection,
    secret_id: Option<i64>,
    actor_id: i64,
    action: AuditAction,
    context: AuditContext,
    ip: Option<&str>,
    metadata: Option<Value>,
) -> Result<AuditEntry> {
    insert(conn, now(), secret_id, actor_id, action, context, ip, metadata)
}

/// Record the same event for many secrets.  All entries share one
/// timestamp because they describe one logical operation.
pub fn record_bulk(
    conn: &Connection,
    secret_ids: &[i64],
    actor_id: i64,
    action: AuditAction,
    context: AuditContext,
    ip: Option<&str>,
    metadata: Option<Value>,
) -> Result<()> {
    let timestamp = now();
    for &id in secret_ids {
        insert(
            conn,
            timestamp,
            Some(id),
            actor_id,
            action,
            context,
            ip,
            metadata.clone(),
        )?;
    }
    Ok(())
}

/// Like `record_bulk`, but with per-secret metadata.
pub fn record_each(
    conn: &Connection,
    items: Vec<(i64, Option<Value>)>,
    actor_id: i64,
    action: AuditAction,
    context: AuditContext,
    ip: Option<&str>,
) -> Result<()> {
    let timestamp = now();
    for (id, metadata) in items {
        insert(
            conn,
            timestamp,
            Some(id),
            actor_id,
            action,
            context,
            ip,
            metadata,
        )?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn insert(
    conn: &Connection,
    timestamp: DateTime<Utc>,
    secret_id: Option<i64>,
    actor_id: i64,
    action: AuditAction,
    context: AuditContext,
    ip: Option<&str>,
    metadata: Option<Value>,
) -> Result<AuditEntry> {
    let metadata_json = metadata.as_ref().map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO audit_log (secret_id, actor_id, action, context, ip_address, metadata, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            secret_id,
            actor_id,
            action.as_str(),
            context.as_str(),
            ip,
            metadata_json,
            format_timestamp(timestamp)
        ],
    )?;

    Ok(AuditEntry {
        id: conn.last_insert_rowid(),
        secret_id,
        actor_id,
        action,
        context,
        ip_address: ip.map(str::to_string),
        metadata,
        timestamp,
        secret_name: None,
    })
}

// ---------------------------------------------------------------------------
// Querying
// ---------------------------------------------------------------------------

/// Sort direction for audit listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filters for `query`.  Unset fields do not constrain the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub secret_id: Option<i64>,
    /// Case-insensitive substring matched against action, context, ip
    /// address and secret name.
    pub search: Option<String>,
    /// First day included (UTC).
    pub from: Option<NaiveDate>,
    /// Last day included (UTC), through the end of that day.
    pub to: Option<NaiveDate>,
    pub order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            action: None,
            secret_id: None,
            search: None,
            from: None,
            to: None,
            order: SortOrder::NewestFirst,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One page of audit entries.
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    /// Matching entries across all pages.
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl AuditPage {
    pub fn total_pages(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            let per_page = u64::from(self.per_page.max(1));
            (self.total + per_page - 1) / per_page
        }
    }
}

/// List audit entries belonging to `owner_id`, filtered and paginated.
///
/// Entries are scoped by actor: an owner only ever sees the history of
/// actions taken on their own account.
pub fn query(conn: &Connection, owner_id: i64, filter: &AuditFilter) -> Result<AuditPage> {
    let mut clauses = vec!["a.actor_id = ?".to_string()];
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(owner_id)];

    if let Some(action) = filter.action {
        clauses.push("a.action = ?".into());
        values.push(Box::new(action.as_str()));
    }

    if let Some(secret_id) = filter.secret_id {
        clauses.push("a.secret_id = ?".into());
        values.push(Box::new(secret_id));
    }

    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        clauses.push(
            "(a.action LIKE ? ESCAPE '\\'
              OR a.context LIKE ? ESCAPE '\\'
              OR IFNULL(a.ip_address, '') LIKE ? ESCAPE '\\'
              OR IFNULL(s.name, IFNULL(json_extract(a.metadata, '$.name'), '')) LIKE ? ESCAPE '\\')"
                .into(),
        );
        let pattern = format!("%{}%", escape_like(term));
        for _ in 0..4 {
            values.push(Box::new(pattern.clone()));
        }
    }

    let mut errors = ValidationErrors::new();
    if filter.from.is_some_and(|d| !storable_year(d.year())) {
        errors.add("from", "must fall within years 0000 to 9999");
    }
    if filter.to.is_some_and(|d| !storable_year(d.year())) {
        errors.add("to", "must fall within years 0000 to 9999");
    }
    errors.into_result()?;

    if let Some(from) = filter.from {
        clauses.push("a.timestamp >= ?".into());
        values.push(Box::new(format_timestamp(start_of_day(from))));
    }

    // Inclusive end date: everything before the next midnight.  Past the
    // last storable day there is no upper bound to apply.
    let before = filter
        .to
        .and_then(|to| start_of_day(to).checked_add_signed(Duration::days(1)))
        .filter(|next| is_storable(*next));
    if let Some(before) = before {
        clauses.push("a.timestamp < ?".into());
        values.push(Box::new(format_timestamp(before)));
    }

    let where_sql = clauses.join(" AND ");
    let from_sql = "FROM audit_log a LEFT JOIN secrets s ON s.id = a.secret_id";

    let value_refs: Vec<&dyn ToSql> = values.iter().map(|v| &**v).collect();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {from_sql} WHERE {where_sql}"),
        value_refs.as_slice(),
        |row| row.get(0),
    )?;

    let per_page = filter.per_page.clamp(1, MAX_PER_PAGE);
    let page = filter.page.max(1);
    let offset = i64::from(page - 1) * i64::from(per_page);
    let direction = match filter.order {
        SortOrder::NewestFirst => "DESC",
        SortOrder::OldestFirst => "ASC",
    };

    let sql = format!(
        "SELECT a.id, a.secret_id, a.actor_id, a.action, a.context, a.ip_address,
                a.metadata, a.timestamp, IFNULL(s.name, json_extract(a.metadata, '$.name'))
         {from_sql}
         WHERE {where_sql}
         ORDER BY a.timestamp {direction}, a.id {direction}
         LIMIT {per_page} OFFSET {offset}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(value_refs.as_slice(), entry_from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }

    Ok(AuditPage {
        entries,
        total: u64::try_from(total).unwrap_or(0),
        page,
        per_page,
    })
}

/// Every entry referencing `secret_id`, oldest first, regardless of owner.
///
/// Used for forensic reconstruction and by tests; not exposed to owners.
pub fn history_for_secret(conn: &Connection, secret_id: i64) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.secret_id, a.actor_id, a.action, a.context, a.ip_address,
                a.metadata, a.timestamp, IFNULL(s.name, json_extract(a.metadata, '$.name'))
         FROM audit_log a LEFT JOIN secrets s ON s.id = a.secret_id
         WHERE a.secret_id = ?1
         ORDER BY a.id ASC",
    )?;
    let rows = stmt.query_map([secret_id], entry_from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let action: String = row.get(3)?;
    let context: String = row.get(4)?;
    let metadata: Option<String> = row.get(6)?;
    let timestamp: String = row.get(7)?;

    Ok(AuditEntry {
        id: row.get(0)?,
        secret_id: row.get(1)?,
        actor_id: row.get(2)?,
        action: action.parse().map_err(|e| conversion_error(3, e))?,
        context: context.parse().map_err(|e| conversion_error(4, e))?,
        ip_address: row.get(5)?,
        metadata: metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()
            .map_err(|e| conversion_error(6, e))?,
        timestamp: parse_timestamp(7, &timestamp)?,
        secret_name: row.get(8)?,
    })
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
