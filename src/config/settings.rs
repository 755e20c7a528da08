use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::{KeyRing, MasterKey};
use crate::errors::{Result, VaultError};

/// Environment variable prefix for master key material.
///
/// `CREDVAULT_MASTER_KEY_2=<base64>` adds or replaces key version 2.
pub const MASTER_KEY_ENV_PREFIX: &str = "CREDVAULT_MASTER_KEY_";

/// Environment variable overriding `current_key_version`.
pub const KEY_VERSION_ENV: &str = "CREDVAULT_KEY_VERSION";

/// Project-level configuration, loaded from `.credvault.toml`.
///
/// Every field has a default so credvault starts without a config file;
/// master keys, however, must come from the file or the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database path (relative paths resolve against the project dir).
    #[serde(default = "default_database")]
    pub database: String,

    /// Master key version used for new encryptions.
    #[serde(default = "default_key_version")]
    pub current_key_version: u32,

    /// Version number (as a string key) to base64-encoded 32-byte key.
    #[serde(default)]
    pub master_keys: BTreeMap<String, String>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_database() -> String {
    ".credvault/vault.db".to_string()
}

fn default_key_version() -> u32 {
    1
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database(),
            current_key_version: default_key_version(),
            master_keys: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".credvault.toml";

    /// Load settings from `<project_dir>/.credvault.toml`.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_file(&config_path)
    }

    /// Load settings from an explicit file, which must exist.
    pub fn load_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Err(VaultError::ConfigNotFound(config_path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(config_path)?;

        toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })
    }

    /// Layer environment overrides on top of the file values.
    pub fn apply_env(&mut self) -> Result<()> {
        let vars = std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        });
        self.apply_overrides(vars)
    }

    /// Layer `(name, value)` overrides on top of the file values.
    ///
    /// Split out from `apply_env` so tests do not mutate process state.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if name == KEY_VERSION_ENV {
                self.current_key_version = value.trim().parse().map_err(|_| {
                    VaultError::Configuration(format!(
                        "{KEY_VERSION_ENV} must be a positive integer, got '{value}'"
                    ))
                })?;
            } else if let Some(version) = name.strip_prefix(MASTER_KEY_ENV_PREFIX) {
                self.master_keys.insert(version.to_string(), value);
            }
        }
        Ok(())
    }

    /// Build the full path to the database file.
    pub fn database_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.database)
    }

    /// Decode every configured master key into a key ring.
    ///
    /// Any key that is not base64 or not exactly 32 bytes fails the whole
    /// ring: a vault must never run with silently skipped key material.
    pub fn key_ring(&self) -> Result<KeyRing> {
        let mut keys = Vec::with_capacity(self.master_keys.len());
        for (version, encoded) in &self.master_keys {
            let version: u32 = version.trim().parse().map_err(|_| {
                VaultError::Configuration(format!(
                    "master key version '{version}' is not a positive integer"
                ))
            })?;
            keys.push(MasterKey::from_base64(version, encoded)?);
        }

        KeyRing::new(self.current_key_version, keys)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
