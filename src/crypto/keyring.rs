//! Versioned master keys.
//!
//! A `KeyRing` holds every master key version that is still referenced
//! by stored data plus a pointer to the version new writes should use.
//! Master keys only ever wrap data keys; they never touch payloads.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{Result, VaultError};

/// Length of a master key (256 bits, for AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// A 32-byte master key tagged with its version.  Zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    version: u32,
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    pub fn new(version: u32, bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self { version, bytes }
    }

    /// Decode a base64 master key.
    ///
    /// The decoded length must be exactly 32 bytes; anything else is a
    /// configuration error rather than being truncated or padded.
    pub fn from_base64(version: u32, encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(BASE64.decode(encoded.trim()).map_err(|_| {
            VaultError::Configuration(format!("master key v{version} is not valid base64"))
        })?);

        if decoded.len() != MASTER_KEY_LEN {
            return Err(VaultError::Configuration(format!(
                "master key v{version} must decode to {MASTER_KEY_LEN} bytes, got {}",
                decoded.len()
            )));
        }

        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self::new(version, bytes))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Every configured master key plus the version used for new writes.
#[derive(Debug)]
pub struct KeyRing {
    current: u32,
    keys: BTreeMap<u32, MasterKey>,
}

impl KeyRing {
    /// Build a key ring.  Rejects duplicate versions and a current
    /// pointer that names no configured key.
    pub fn new(current: u32, keys: impl IntoIterator<Item = MasterKey>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for key in keys {
            let version = key.version();
            if map.insert(version, key).is_some() {
                return Err(VaultError::Configuration(format!(
                    "master key v{version} is configured twice"
                )));
            }
        }

        if !map.contains_key(&current) {
            return Err(VaultError::Configuration(format!(
                "current key version {current} has no configured master key"
            )));
        }

        Ok(Self { current, keys: map })
    }

    /// Version that new encryptions use.
    pub fn current_version(&self) -> u32 {
        self.current
    }

    /// Look up the master key for `version`.
    pub fn resolve(&self, version: u32) -> Result<&MasterKey> {
        self.keys.get(&version).ok_or_else(|| {
            VaultError::Configuration(format!("no master key configured for version {version}"))
        })
    }

    /// All configured versions, ascending.
    pub fn versions(&self) -> Vec<u32> {
        self.keys.keys().copied().collect()
    }
}

/// Generate a fresh random master key, base64-encoded for configuration.
pub fn generate_master_key() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; MASTER_KEY_LEN]);
    rand::rng().fill_bytes(&mut bytes[..]);
    Zeroizing::new(BASE64.encode(&bytes[..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_base64_accepts_32_bytes() {
        let encoded = BASE64.encode([0x11u8; 32]);
        let key = MasterKey::from_base64(3, &encoded).unwrap();
        assert_eq!(key.version(), 3);
        assert_eq!(key.as_bytes(), &[0x11u8; 32]);
    }

    #[test]
    fn from_base64_rejects_short_and_long_keys() {
        for len in [16usize, 31, 33, 64] {
            let encoded = BASE64.encode(vec![0u8; len]);
            let err = MasterKey::from_base64(1, &encoded).unwrap_err();
            assert!(matches!(err, VaultError::Configuration(_)), "len {len}");
        }
    }

    #[test]
    fn from_base64_rejects_garbage() {
        assert!(matches!(
            MasterKey::from_base64(1, "not base64 at all!"),
            Err(VaultError::Configuration(_))
        ));
    }

    #[test]
    fn resolve_unknown_version_is_configuration_error() {
        let ring = KeyRing::new(1, [MasterKey::new(1, [1u8; 32])]).unwrap();
        assert!(matches!(ring.resolve(2), Err(VaultError::Configuration(_))));
        assert_eq!(ring.resolve(1).unwrap().version(), 1);
    }

    #[test]
    fn current_version_must_exist() {
        let result = KeyRing::new(2, [MasterKey::new(1, [1u8; 32])]);
        assert!(matches!(result, Err(VaultError::Configuration(_))));
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let result = KeyRing::new(
            1,
            [MasterKey::new(1, [1u8; 32]), MasterKey::new(1, [2u8; 32])],
        );
        assert!(result.is_err());
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let key = MasterKey::new(7, [0xEEu8; 32]);
        let shown = format!("{key:?}");
        assert!(shown.contains("version: 7"));
        assert!(!shown.contains("238"));
    }

    #[test]
    fn generated_keys_decode_to_32_bytes() {
        let encoded = generate_master_key();
        assert!(MasterKey::from_base64(1, &encoded).is_ok());
        assert_ne!(*encoded, *generate_master_key());
    }
}
