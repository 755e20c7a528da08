//! Credential records and the inputs used to create or change them.
//!
//! The password of a `SecretRecord` is held only as the envelope triple
//! (ciphertext, wrapped key, key version).  Plaintext crosses the entity
//! boundary exclusively through `encrypt_field` and `decrypt_field`, and
//! the triple is skipped when a record is serialized.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{EncryptedSecret, EnvelopeCipher};
use crate::errors::{Result, VaultError};

/// Names longer than this are masked for display.
pub const MASK_THRESHOLD: usize = 24;

/// Characters kept at each end of a masked name.
pub const MASK_KEEP: usize = 8;

/// Fixed-width marker replacing the middle of a masked name.
pub const MASK_MARKER: &str = "********";

/// What kind of credential a record holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretKind {
    /// A plain password, optionally with a username and url.
    #[default]
    Normal,
    /// SSH credentials; username and host are mandatory.
    Ssh,
}

impl SecretKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SecretKind::Normal => "normal",
            SecretKind::Ssh => "ssh",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(SecretKind::Normal),
            "ssh" => Ok(SecretKind::Ssh),
            _ => Err(VaultError::CommandFailed(format!(
                "unknown secret type '{s}' (expected normal or ssh)"
            ))),
        }
    }
}

/// A stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretRecord {
    pub id: i64,
    pub owner_id: i64,
    /// Unique per owner.
    pub name: String,
    pub kind: SecretKind,
    pub username: Option<String>,
    /// Host for ssh secrets, url for normal ones.
    pub host: Option<String>,

    /// Password encrypted under its data key.  Empty for an empty password.
    #[serde(skip)]
    pub password_ciphertext: Vec<u8>,
    /// Data key wrapped under the master key.
    #[serde(skip)]
    pub password_wrapped_key: Option<Vec<u8>>,
    /// Master key version that wrapped the data key.
    #[serde(skip)]
    pub password_key_version: Option<u32>,

    pub folder_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-lock counter, bumped on every write.
    pub version: i64,
}

impl SecretRecord {
    /// A record that has not been persisted yet (`id` is 0).
    pub fn new(owner_id: i64, name: impl Into<String>, kind: SecretKind, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            owner_id,
            name: name.into(),
            kind,
            username: None,
            host: None,
            password_ciphertext: Vec::new(),
            password_wrapped_key: None,
            password_key_version: None,
            folder_id: None,
            expires_at: None,
            usage_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Encrypt `plaintext` and store the resulting triple.
    ///
    /// An empty password bypasses encryption: the record stores an empty
    /// ciphertext and no wrapped key or version.
    pub fn encrypt_field(&mut self, cipher: &EnvelopeCipher, plaintext: &str) -> Result<()> {
        if plaintext.is_empty() {
            self.password_ciphertext = Vec::new();
            self.password_wrapped_key = None;
            self.password_key_version = None;
            return Ok(());
        }

        self.store_sealed(cipher.encrypt(plaintext.as_bytes(), None)?);
        Ok(())
    }

    /// Decrypt the stored password.
    pub fn decrypt_field(&self, cipher: &EnvelopeCipher) -> Result<Zeroizing<String>> {
        let Some(sealed) = self.sealed_password()? else {
            return Ok(Zeroizing::new(String::new()));
        };

        let bytes = cipher.decrypt(&sealed.ciphertext, &sealed.wrapped_key, sealed.key_version)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| VaultError::Integrity(format!("secret {} is not valid UTF-8", self.id)))?;
        Ok(Zeroizing::new(text.to_string()))
    }

    /// Re-wrap the password under `target` (the current version when
    /// `None`).  Returns the previous version when the record changed.
    pub fn rotate_field(&mut self, cipher: &EnvelopeCipher, target: Option<u32>) -> Result<Option<u32>> {
        let target = target.unwrap_or_else(|| cipher.current_version());
        let Some(sealed) = self.sealed_password()? else {
            return Ok(None);
        };
        if sealed.key_version == target {
            return Ok(None);
        }

        let rotated = cipher.re_encrypt(
            &sealed.ciphertext,
            &sealed.wrapped_key,
            sealed.key_version,
            Some(target),
        )?;
        self.store_sealed(rotated);
        Ok(Some(sealed.key_version))
    }

    /// The stored envelope triple, or `None` for an empty password.
    ///
    /// Ciphertext without its wrapped key or version is corrupt data and
    /// fails with an integrity error; it is never treated as empty.
    pub fn sealed_password(&self) -> Result<Option<EncryptedSecret>> {
        if self.password_ciphertext.is_empty() {
            return Ok(None);
        }

        match (&self.password_wrapped_key, self.password_key_version) {
            (Some(wrapped), Some(version)) => Ok(Some(EncryptedSecret {
                ciphertext: self.password_ciphertext.clone(),
                wrapped_key: wrapped.clone(),
                key_version: version,
            })),
            _ => Err(VaultError::Integrity(format!(
                "secret {} has ciphertext but no wrapping metadata",
                self.id
            ))),
        }
    }

    fn store_sealed(&mut self, sealed: EncryptedSecret) {
        self.password_ciphertext = sealed.ciphertext;
        self.password_wrapped_key = Some(sealed.wrapped_key);
        self.password_key_version = Some(sealed.key_version);
    }

    /// Display form of the name: long names keep their first and last
    /// eight characters around a fixed marker.
    pub fn masked_name(&self) -> String {
        mask_name(&self.name)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Mask the middle of a long name.
pub fn mask_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= MASK_THRESHOLD {
        return name.to_string();
    }

    let head: String = chars[..MASK_KEEP].iter().collect();
    let tail: String = chars[chars.len() - MASK_KEEP..].iter().collect();
    format!("{head}{MASK_MARKER}{tail}")
}

/// Id and name only, for pickers and filter dropdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretSummary {
    pub id: i64,
    pub name: String,
}

/// Fields supplied when creating or updating a secret.
#[derive(Clone, Default)]
pub struct SecretInput {
    pub name: String,
    pub kind: SecretKind,
    pub username: Option<String>,
    pub host: Option<String>,
    /// `user@host` (optionally prefixed with `ssh`).  For ssh secrets this
    /// overrides `username` and `host`.
    pub connection: Option<String>,
    /// `None` on update leaves the stored password untouched.
    pub password: Option<Zeroizing<String>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub folder_id: Option<i64>,
}

impl SecretInput {
    pub fn normal(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SecretKind::Normal,
            password: Some(Zeroizing::new(password.into())),
            ..Self::default()
        }
    }

    pub fn ssh(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SecretKind::Ssh,
            password: Some(Zeroizing::new(password.into())),
            ..Self::default()
        }
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_folder(mut self, folder_id: i64) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Start an update from a record's current plaintext fields, leaving
    /// the password unchanged.
    pub fn from_record(record: &SecretRecord) -> Self {
        Self {
            name: record.name.clone(),
            kind: record.kind,
            username: record.username.clone(),
            host: record.host.clone(),
            connection: None,
            password: None,
            expires_at: record.expires_at,
            folder_id: record.folder_id,
        }
    }
}

impl fmt::Debug for SecretInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretInput")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("username", &self.username)
            .field("host", &self.host)
            .field("connection", &self.connection)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("folder_id", &self.folder_id)
            .finish()
    }
}
