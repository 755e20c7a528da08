//! SQLite persistence for secrets, folders and the audit log.
//!
//! `Store` owns the connection and hands out transactions.  The free
//! functions below take a plain `&Connection` so they run equally on the
//! connection or inside a `Transaction` (which derefs to one); vault
//! operations always call them on a transaction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use super::secret::{SecretRecord, SecretSummary};
use crate::errors::{Result, VaultError};

/// Secrets and folders.  The audit log schema lives in `crate::audit`.
///
/// `AUTOINCREMENT` keeps ids from ever being reused, so a historical
/// `secret_id` in the audit log can never point at a newer secret.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS folders (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    INTEGER NOT NULL,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (owner_id, name)
);
CREATE TABLE IF NOT EXISTS secrets (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id              INTEGER NOT NULL,
    name                  TEXT NOT NULL,
    kind                  TEXT NOT NULL,
    username              TEXT,
    host                  TEXT,
    password_ciphertext   BLOB NOT NULL,
    password_wrapped_key  BLOB,
    password_key_version  INTEGER,
    folder_id             INTEGER REFERENCES folders (id) ON DELETE SET NULL,
    expires_at            TEXT,
    usage_count           INTEGER NOT NULL DEFAULT 0,
    last_used_at          TEXT,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    version               INTEGER NOT NULL DEFAULT 1,
    UNIQUE (owner_id, name)
);
CREATE INDEX IF NOT EXISTS idx_secrets_owner ON secrets (owner_id);
";

const SECRET_COLUMNS: &str = "id, owner_id, name, kind, username, host, password_ciphertext,
    password_wrapped_key, password_key_version, folder_id, expires_at, usage_count,
    last_used_at, created_at, updated_at, version";

/// A folder, reduced to what ownership checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Owner of the SQLite connection.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// The parent directory is created if needed and the file is
    /// restricted to the owner on Unix.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            conn: Connection::open(path)?,
            path: Some(path.to_path_buf()),
        };
        store.migrate()?;

        // The schema write guarantees the file exists on disk.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        debug!(path = %path.display(), "opened vault database");
        Ok(store)
    }

    /// A private in-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute_batch(crate::audit::SCHEMA)?;
        Ok(())
    }

    /// Begin a transaction.  Dropping it without `commit` rolls back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current time at the precision the database stores.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Years the fixed-width text form can hold.
pub const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Whether `year` round-trips through the text form.  Years outside
/// four digits gain a sign, which RFC 3339 parsing rejects and which
/// breaks text ordering.
pub fn storable_year(year: i32) -> bool {
    STORABLE_YEARS.contains(&year)
}

pub fn is_storable(ts: DateTime<Utc>) -> bool {
    storable_year(ts.year())
}

/// Fixed-width UTC form, so text comparison orders chronologically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_optional_timestamp(
    column: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

fn secret_from_row(row: &Row<'_>) -> rusqlite::Result<SecretRecord> {
    let kind: String = row.get(3)?;
    let key_version: Option<i64> = row.get(8)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(SecretRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        kind: kind.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        username: row.get(4)?,
        host: row.get(5)?,
        password_ciphertext: row.get(6)?,
        password_wrapped_key: row.get(7)?,
        password_key_version: key_version
            .map(u32::try_from)
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    8,
                    rusqlite::types::Type::Integer,
                    Box::new(e),
                )
            })?,
        folder_id: row.get(9)?,
        expires_at: parse_optional_timestamp(10, row.get(10)?)?,
        usage_count: row.get(11)?,
        last_used_at: parse_optional_timestamp(12, row.get(12)?)?,
        created_at: parse_timestamp(13, &created_at)?,
        updated_at: parse_timestamp(14, &updated_at)?,
        version: row.get(15)?,
    })
}

/// Insert a new secret and return its id.
pub fn insert_secret(conn: &Connection, record: &SecretRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO secrets (owner_id, name, kind, username, host, password_ciphertext,
            password_wrapped_key, password_key_version, folder_id, expires_at, usage_count,
            last_used_at, created_at, updated_at, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            record.owner_id,
            record.name,
            record.kind.as_str(),
            record.username,
            record.host,
            record.password_ciphertext,
            record.password_wrapped_key,
            record.password_key_version,
            record.folder_id,
            record.expires_at.map(format_timestamp),
            record.usage_count,
            record.last_used_at.map(format_timestamp),
            format_timestamp(record.created_at),
            format_timestamp(record.updated_at),
            record.version,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Write every mutable column of `record`, provided the stored row is
/// still at `expected_version`.
///
/// A missing row is `NotFound`; a row at another version was changed by
/// someone else since it was read and yields `Conflict`.
pub fn update_secret(conn: &Connection, record: &SecretRecord, expected_version: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE secrets SET name = ?1, kind = ?2, username = ?3, host = ?4,
            password_ciphertext = ?5, password_wrapped_key = ?6, password_key_version = ?7,
            folder_id = ?8, expires_at = ?9, usage_count = ?10, last_used_at = ?11,
            updated_at = ?12, version = ?13
         WHERE id = ?14 AND version = ?15",
        params![
            record.name,
            record.kind.as_str(),
            record.username,
            record.host,
            record.password_ciphertext,
            record.password_wrapped_key,
            record.password_key_version,
            record.folder_id,
            record.expires_at.map(format_timestamp),
            record.usage_count,
            record.last_used_at.map(format_timestamp),
            format_timestamp(record.updated_at),
            record.version,
            record.id,
            expected_version,
        ],
    )?;

    if changed == 1 {
        return Ok(());
    }
    if get_secret(conn, record.id)?.is_none() {
        return Err(VaultError::secret_not_found(record.id));
    }
    Err(VaultError::Conflict(record.id))
}

pub fn delete_secret(conn: &Connection, id: i64) -> Result<()> {
    let removed = conn.execute("DELETE FROM secrets WHERE id = ?1", [id])?;
    if removed == 0 {
        return Err(VaultError::secret_not_found(id));
    }
    Ok(())
}

pub fn get_secret(conn: &Connection, id: i64) -> Result<Option<SecretRecord>> {
    let sql = format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], secret_from_row).optional()?)
}

pub fn find_secret_by_name(conn: &Connection, owner_id: i64, name: &str) -> Result<Option<SecretRecord>> {
    let sql = format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE owner_id = ?1 AND name = ?2");
    Ok(conn
        .query_row(&sql, params![owner_id, name], secret_from_row)
        .optional()?)
}

/// All secrets of one owner, sorted by name.
pub fn list_secrets(conn: &Connection, owner_id: i64) -> Result<Vec<SecretRecord>> {
    let sql = format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE owner_id = ?1 ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([owner_id], secret_from_row)?;

    let mut secrets = Vec::new();
    for row in rows {
        secrets.push(row?);
    }
    Ok(secrets)
}

/// Id and name of every secret of one owner, sorted by name.
pub fn secret_names(conn: &Connection, owner_id: i64) -> Result<Vec<SecretSummary>> {
    let mut stmt = conn.prepare("SELECT id, name FROM secrets WHERE owner_id = ?1 ORDER BY name")?;
    let rows = stmt.query_map([owner_id], |row| {
        Ok(SecretSummary {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;

    let mut names = Vec::new();
    for row in rows {
        names.push(row?);
    }
    Ok(names)
}

/// Whether `owner_id` already has a secret called `name`, other than
/// `except_id`.
pub fn name_taken(conn: &Connection, owner_id: i64, name: &str, except_id: Option<i64>) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM secrets WHERE owner_id = ?1 AND name = ?2 AND id != ?3",
        params![owner_id, name, except_id.unwrap_or(0)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ---------------------------------------------------------------------------
// Folders
// ---------------------------------------------------------------------------

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    let created_at: String = row.get(3)?;
    Ok(Folder {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}

pub fn insert_folder(conn: &Connection, owner_id: i64, name: &str) -> Result<Folder> {
    let created_at = now();
    conn.execute(
        "INSERT INTO folders (owner_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![owner_id, name, format_timestamp(created_at)],
    )?;
    Ok(Folder {
        id: conn.last_insert_rowid(),
        owner_id,
        name: name.to_string(),
        created_at,
    })
}

pub fn get_folder(conn: &Connection, id: i64) -> Result<Option<Folder>> {
    Ok(conn
        .query_row(
            "SELECT id, owner_id, name, created_at FROM folders WHERE id = ?1",
            [id],
            folder_from_row,
        )
        .optional()?)
}

pub fn find_folder_by_name(conn: &Connection, owner_id: i64, name: &str) -> Result<Option<Folder>> {
    Ok(conn
        .query_row(
            "SELECT id, owner_id, name, created_at FROM folders WHERE owner_id = ?1 AND name = ?2",
            params![owner_id, name],
            folder_from_row,
        )
        .optional()?)
}

pub fn list_folders(conn: &Connection, owner_id: i64) -> Result<Vec<Folder>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, name, created_at FROM folders WHERE owner_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map([owner_id], folder_from_row)?;

    let mut folders = Vec::new();
    for row in rows {
        folders.push(row?);
    }
    Ok(folders)
}
