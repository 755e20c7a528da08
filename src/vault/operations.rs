//! Audited vault operations.
//!
//! `Vault` is the only place secrets are mutated.  Each mutation runs in
//! one SQLite transaction that also carries its audit entries, so either
//! both land or neither does.  All checks (ownership, validation, version)
//! happen inside that transaction before the first write.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::Connection;
use serde_json::json;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::secret::{SecretInput, SecretKind, SecretRecord, SecretSummary};
use super::ssh::parse_connection_string;
use super::store::{self, Folder, Store};
use crate::audit::{self, Actor, AuditAction, AuditFilter, AuditPage};
use crate::crypto::{EnvelopeCipher, KeyRing};
use crate::errors::{Result, ValidationErrors, VaultError};

/// Outcome of `Vault::rotate_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSummary {
    /// Records re-wrapped under `to_version`.
    pub rotated: usize,
    /// Records already current, or holding an empty password.
    pub unchanged: usize,
    pub to_version: u32,
}

/// Secret storage bound to one database and one key ring.
pub struct Vault {
    store: Store,
    cipher: EnvelopeCipher,
}

impl Vault {
    pub fn new(store: Store, cipher: EnvelopeCipher) -> Self {
        Self { store, cipher }
    }

    /// Open the database at `path`, creating it if needed.
    pub fn open(path: &Path, keys: KeyRing) -> Result<Self> {
        Ok(Self::new(Store::open(path)?, EnvelopeCipher::new(keys)))
    }

    pub fn open_in_memory(keys: KeyRing) -> Result<Self> {
        Ok(Self::new(Store::open_in_memory()?, EnvelopeCipher::new(keys)))
    }

    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Single-secret mutations
    // -----------------------------------------------------------------------

    /// Validate, encrypt and persist a new secret, then record `created`.
    pub fn create(&mut self, actor: &Actor, input: SecretInput) -> Result<SecretRecord> {
        debug!(actor = actor.id, kind = %input.kind, "creating secret");
        let tx = self.store.transaction()?;

        if let Some(folder_id) = input.folder_id {
            owned_folder(&tx, actor.id, folder_id)?;
        }
        let fields = validate(&tx, actor.id, &input, None)?;

        let now = store::now();
        let mut record = SecretRecord::new(actor.id, fields.name, input.kind, now);
        record.username = fields.username;
        record.host = fields.host;
        record.folder_id = input.folder_id;
        record.expires_at = input.expires_at;
        record.last_used_at = Some(now);

        let password = input.password.as_ref().map_or("", |p| p.as_str());
        record.encrypt_field(&self.cipher, password)?;

        record.id = store::insert_secret(&tx, &record)?;
        audit::record(
            &tx,
            Some(record.id),
            actor.id,
            AuditAction::Created,
            actor.context(),
            actor.ip(),
            None,
        )?;
        tx.commit()?;

        info!(secret_id = record.id, actor = actor.id, "created secret");
        Ok(record)
    }

    /// Apply `input` to `secret`.
    ///
    /// `secret` is the record as the caller last saw it; if the stored
    /// row has moved on since, the update fails with `Conflict`.  The
    /// password is re-encrypted only when it actually changed.
    pub fn update(
        &mut self,
        actor: &Actor,
        secret: &SecretRecord,
        input: SecretInput,
    ) -> Result<SecretRecord> {
        debug!(secret_id = secret.id, actor = actor.id, "updating secret");
        let tx = self.store.transaction()?;

        let current = owned_secret(&tx, actor.id, secret.id)?;
        if current.version != secret.version {
            warn!(secret_id = secret.id, "stale update rejected");
            return Err(VaultError::Conflict(secret.id));
        }

        if let Some(folder_id) = input.folder_id {
            owned_folder(&tx, actor.id, folder_id)?;
        }
        let fields = validate(&tx, actor.id, &input, Some(current.id))?;

        let mut updated = current.clone();
        let mut changed: Vec<&'static str> = Vec::new();

        if updated.name != fields.name {
            updated.name = fields.name;
            changed.push("name");
        }
        if updated.kind != input.kind {
            updated.kind = input.kind;
            changed.push("type");
        }
        if updated.username != fields.username {
            updated.username = fields.username;
            changed.push("username");
        }
        if updated.host != fields.host {
            updated.host = fields.host;
            changed.push("host");
        }
        if updated.folder_id != input.folder_id {
            updated.folder_id = input.folder_id;
            changed.push("folder_id");
        }
        if updated.expires_at != input.expires_at {
            updated.expires_at = input.expires_at;
            changed.push("expires_at");
        }
        if let Some(password) = &input.password {
            let stored = current.decrypt_field(&self.cipher)?;
            if stored.as_str() != password.as_str() {
                updated.encrypt_field(&self.cipher, password)?;
                changed.push("password");
            }
        }

        updated.updated_at = store::now();
        updated.version = current.version + 1;
        store::update_secret(&tx, &updated, current.version)?;

        audit::record(
            &tx,
            Some(updated.id),
            actor.id,
            AuditAction::Updated,
            actor.context(),
            actor.ip(),
            Some(json!({ "changed": changed })),
        )?;
        tx.commit()?;

        info!(secret_id = updated.id, actor = actor.id, fields = changed.len(), "updated secret");
        Ok(updated)
    }

    /// Hand out the password: bump usage, refresh last-used, record `copied`.
    pub fn copy(
        &mut self,
        actor: &Actor,
        secret: &SecretRecord,
    ) -> Result<(SecretRecord, Zeroizing<String>)> {
        let tx = self.store.transaction()?;

        let current = owned_secret(&tx, actor.id, secret.id)?;
        let plaintext = current.decrypt_field(&self.cipher)?;

        let mut updated = current.clone();
        updated.usage_count += 1;
        updated.last_used_at = Some(store::now());
        updated.version = current.version + 1;
        store::update_secret(&tx, &updated, current.version)?;

        audit::record(
            &tx,
            Some(updated.id),
            actor.id,
            AuditAction::Copied,
            actor.context(),
            actor.ip(),
            None,
        )?;
        tx.commit()?;

        debug!(secret_id = updated.id, usage = updated.usage_count, "copied secret");
        Ok((updated, plaintext))
    }

    /// Decrypt the password for display and record `viewed`.
    pub fn reveal(&mut self, actor: &Actor, secret: &SecretRecord) -> Result<Zeroizing<String>> {
        let tx = self.store.transaction()?;

        let current = owned_secret(&tx, actor.id, secret.id)?;
        let plaintext = current.decrypt_field(&self.cipher)?;

        audit::record(
            &tx,
            Some(current.id),
            actor.id,
            AuditAction::Viewed,
            actor.context(),
            actor.ip(),
            None,
        )?;
        tx.commit()?;

        debug!(secret_id = current.id, "revealed secret");
        Ok(plaintext)
    }

    /// Record `deleted`, then remove the secret.  The entry keeps the
    /// name so the history stays readable after the row is gone.
    pub fn delete(&mut self, actor: &Actor, secret: &SecretRecord) -> Result<()> {
        let tx = self.store.transaction()?;

        let current = owned_secret(&tx, actor.id, secret.id)?;
        audit::record(
            &tx,
            Some(current.id),
            actor.id,
            AuditAction::Deleted,
            actor.context(),
            actor.ip(),
            Some(json!({ "name": current.name })),
        )?;
        store::delete_secret(&tx, current.id)?;
        tx.commit()?;

        info!(secret_id = current.id, actor = actor.id, "deleted secret");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bulk mutations
    // -----------------------------------------------------------------------

    /// Delete every secret in `ids`, or none of them.
    pub fn destroy_bulk(&mut self, actor: &Actor, ids: &[i64]) -> Result<usize> {
        let tx = self.store.transaction()?;

        let records = owned_secrets(&tx, actor.id, ids)?;
        let items = records
            .iter()
            .map(|r| (r.id, Some(json!({ "name": r.name }))))
            .collect();
        audit::record_each(
            &tx,
            items,
            actor.id,
            AuditAction::BulkDeleted,
            actor.context(),
            actor.ip(),
        )?;
        for record in &records {
            store::delete_secret(&tx, record.id)?;
        }
        tx.commit()?;

        info!(count = records.len(), actor = actor.id, "bulk deleted secrets");
        Ok(records.len())
    }

    /// Put every secret in `ids` into `folder_id` (`None` for no folder).
    pub fn move_to_folder(
        &mut self,
        actor: &Actor,
        ids: &[i64],
        folder_id: Option<i64>,
    ) -> Result<Vec<SecretRecord>> {
        let tx = self.store.transaction()?;

        let records = owned_secrets(&tx, actor.id, ids)?;
        if let Some(folder_id) = folder_id {
            owned_folder(&tx, actor.id, folder_id)?;
        }

        let now = store::now();
        let mut moved = Vec::with_capacity(records.len());
        for mut record in records {
            let expected = record.version;
            record.folder_id = folder_id;
            record.updated_at = now;
            record.version += 1;
            store::update_secret(&tx, &record, expected)?;
            moved.push(record);
        }

        let moved_ids: Vec<i64> = moved.iter().map(|r| r.id).collect();
        audit::record_bulk(
            &tx,
            &moved_ids,
            actor.id,
            AuditAction::MovedToFolder,
            actor.context(),
            actor.ip(),
            Some(json!({ "folder_id": folder_id })),
        )?;
        tx.commit()?;

        info!(count = moved.len(), folder_id = ?folder_id, "moved secrets");
        Ok(moved)
    }

    /// Take every secret in `ids` out of its folder.
    pub fn remove_from_folder(&mut self, actor: &Actor, ids: &[i64]) -> Result<Vec<SecretRecord>> {
        let tx = self.store.transaction()?;

        let records = owned_secrets(&tx, actor.id, ids)?;

        let now = store::now();
        let mut items = Vec::with_capacity(records.len());
        let mut removed = Vec::with_capacity(records.len());
        for mut record in records {
            let expected = record.version;
            items.push((record.id, Some(json!({ "previous_folder_id": record.folder_id }))));
            record.folder_id = None;
            record.updated_at = now;
            record.version += 1;
            store::update_secret(&tx, &record, expected)?;
            removed.push(record);
        }

        audit::record_each(
            &tx,
            items,
            actor.id,
            AuditAction::RemovedFromFolder,
            actor.context(),
            actor.ip(),
        )?;
        tx.commit()?;

        info!(count = removed.len(), "removed secrets from folders");
        Ok(removed)
    }

    /// Re-wrap every secret of `actor` still under an older master key.
    pub fn rotate_keys(&mut self, actor: &Actor) -> Result<RotationSummary> {
        let to_version = self.cipher.current_version();
        info!(actor = actor.id, to_version, "starting key rotation");

        let tx = self.store.transaction()?;
        let mut summary = RotationSummary {
            rotated: 0,
            unchanged: 0,
            to_version,
        };

        for mut record in store::list_secrets(&tx, actor.id)? {
            let expected = record.version;
            let Some(from_version) = record.rotate_field(&self.cipher, Some(to_version))? else {
                summary.unchanged += 1;
                continue;
            };

            record.version += 1;
            store::update_secret(&tx, &record, expected)?;
            audit::record(
                &tx,
                Some(record.id),
                actor.id,
                AuditAction::Updated,
                actor.context(),
                actor.ip(),
                Some(json!({
                    "reason": "key_rotation",
                    "from_version": from_version,
                    "to_version": to_version,
                })),
            )?;
            summary.rotated += 1;
        }
        tx.commit()?;

        info!(rotated = summary.rotated, unchanged = summary.unchanged, "key rotation finished");
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, actor: &Actor, id: i64) -> Result<SecretRecord> {
        owned_secret(self.store.connection(), actor.id, id)
    }

    pub fn find_by_name(&self, actor: &Actor, name: &str) -> Result<SecretRecord> {
        store::find_secret_by_name(self.store.connection(), actor.id, name.trim())?.ok_or_else(|| {
            VaultError::NamedNotFound {
                entity: "secret",
                name: name.trim().to_string(),
            }
        })
    }

    pub fn list(&self, actor: &Actor) -> Result<Vec<SecretRecord>> {
        store::list_secrets(self.store.connection(), actor.id)
    }

    /// Id and name of every secret, for filter choices.
    pub fn secret_names(&self, actor: &Actor) -> Result<Vec<SecretSummary>> {
        store::secret_names(self.store.connection(), actor.id)
    }

    /// The actor's own audit history.
    pub fn audit(&self, actor: &Actor, filter: &AuditFilter) -> Result<AuditPage> {
        audit::query(self.store.connection(), actor.id, filter)
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    pub fn create_folder(&mut self, actor: &Actor, name: &str) -> Result<Folder> {
        let name = name.trim();
        let tx = self.store.transaction()?;

        let mut errors = ValidationErrors::new();
        if name.is_empty() {
            errors.add("name", "is required");
        } else if store::find_folder_by_name(&tx, actor.id, name)?.is_some() {
            errors.add("name", "is already in use");
        }
        errors.into_result()?;

        let folder = store::insert_folder(&tx, actor.id, name)?;
        tx.commit()?;

        info!(folder_id = folder.id, actor = actor.id, "created folder");
        Ok(folder)
    }

    pub fn find_folder(&self, actor: &Actor, name: &str) -> Result<Folder> {
        store::find_folder_by_name(self.store.connection(), actor.id, name.trim())?.ok_or_else(|| {
            VaultError::NamedNotFound {
                entity: "folder",
                name: name.trim().to_string(),
            }
        })
    }

    pub fn list_folders(&self, actor: &Actor) -> Result<Vec<Folder>> {
        store::list_folders(self.store.connection(), actor.id)
    }
}

// ---------------------------------------------------------------------------
// Checks shared by the operations above
// ---------------------------------------------------------------------------

/// Plaintext fields after normalisation and SSH derivation.
struct ValidFields {
    name: String,
    username: Option<String>,
    host: Option<String>,
}

/// Check every field of `input` and report all problems at once.
fn validate(
    conn: &Connection,
    owner_id: i64,
    input: &SecretInput,
    except_id: Option<i64>,
) -> Result<ValidFields> {
    let mut errors = ValidationErrors::new();

    let name = input.name.trim().to_string();
    if name.is_empty() {
        errors.add("name", "is required");
    } else if store::name_taken(conn, owner_id, &name, except_id)? {
        errors.add("name", "is already in use");
    }

    let mut username = non_blank(input.username.as_deref());
    let mut host = non_blank(input.host.as_deref());

    if input.kind == SecretKind::Ssh {
        match non_blank(input.connection.as_deref()) {
            Some(connection) => match parse_connection_string(&connection) {
                Some(target) => {
                    username = Some(target.username);
                    host = Some(target.host);
                }
                None => errors.add("connection", "must look like user@host"),
            },
            None => {
                if username.is_none() {
                    errors.add("username", "is required for ssh secrets");
                }
                if host.is_none() {
                    errors.add("host", "is required for ssh secrets");
                }
            }
        }
    } else if non_blank(input.connection.as_deref()).is_some() {
        errors.add("connection", "only applies to ssh secrets");
    }

    if input.expires_at.is_some_and(|at| !store::is_storable(at)) {
        errors.add("expires_at", "must fall within years 0000 to 9999");
    }

    if !errors.is_empty() {
        warn!(fields = ?errors.fields(), "secret input rejected");
    }
    errors.into_result()?;

    Ok(ValidFields {
        name,
        username,
        host,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Load a secret and make sure `owner_id` owns it.
fn owned_secret(conn: &Connection, owner_id: i64, id: i64) -> Result<SecretRecord> {
    match store::get_secret(conn, id)? {
        None => Err(VaultError::secret_not_found(id)),
        Some(record) if record.owner_id != owner_id => {
            warn!(secret_id = id, actor = owner_id, "access to foreign secret rejected");
            Err(VaultError::secret_forbidden(id))
        }
        Some(record) => Ok(record),
    }
}

/// Load every secret in `ids`, failing with all offending ids if any is
/// missing or foreign.  Foreign ids take precedence: when any id belongs
/// to someone else the error is `Authorization` and lists missing ids too.
fn owned_secrets(conn: &Connection, owner_id: i64, ids: &[i64]) -> Result<Vec<SecretRecord>> {
    if ids.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("ids", "select at least one secret");
        return Err(VaultError::Validation(errors));
    }

    let unique: BTreeSet<i64> = ids.iter().copied().collect();
    let mut records = Vec::with_capacity(unique.len());
    let mut missing = Vec::new();
    let mut foreign = Vec::new();

    for id in unique {
        match store::get_secret(conn, id)? {
            None => missing.push(id),
            Some(record) if record.owner_id != owner_id => foreign.push(id),
            Some(record) => records.push(record),
        }
    }

    if !foreign.is_empty() {
        let mut offending = foreign;
        offending.extend(missing);
        offending.sort_unstable();
        warn!(ids = ?offending, actor = owner_id, "bulk operation rejected");
        return Err(VaultError::Authorization {
            entity: "secret",
            ids: offending,
        });
    }
    if !missing.is_empty() {
        return Err(VaultError::NotFound {
            entity: "secret",
            ids: missing,
        });
    }
    Ok(records)
}

fn owned_folder(conn: &Connection, owner_id: i64, id: i64) -> Result<Folder> {
    match store::get_folder(conn, id)? {
        None => Err(VaultError::NotFound {
            entity: "folder",
            ids: vec![id],
        }),
        Some(folder) if folder.owner_id != owner_id => {
            warn!(folder_id = id, actor = owner_id, "access to foreign folder rejected");
            Err(VaultError::Authorization {
                entity: "folder",
                ids: vec![id],
            })
        }
        Some(folder) => Ok(folder),
    }
}
