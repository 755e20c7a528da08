//! Envelope encryption.
//!
//! Every `encrypt` call draws a fresh 32-byte data encryption key (DEK),
//! encrypts the payload under it, then wraps the DEK under the master
//! key of the requested version.  Only the wrapped DEK is ever returned;
//! the raw DEK lives in zeroizing memory for the duration of the call.
//!
//! The key version is bound into the wrap as associated data, so a
//! wrapped key presented with the wrong version fails authentication
//! even if two versions happened to share key material.

use rand::RngCore;
use tracing::trace;
use zeroize::Zeroizing;

use super::encryption::{decrypt, encrypt};
use super::keyring::KeyRing;
use crate::errors::{Result, VaultError};

/// Length of a data encryption key in bytes.
pub const DEK_LEN: usize = 32;

/// The persisted triple produced by one envelope encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    /// Payload encrypted under the DEK (nonce || ciphertext || tag).
    pub ciphertext: Vec<u8>,
    /// DEK encrypted under the master key (nonce || ciphertext || tag).
    pub wrapped_key: Vec<u8>,
    /// Master key version that wrapped the DEK.
    pub key_version: u32,
}

/// Encrypts and decrypts payloads against an explicit key ring.
#[derive(Debug)]
pub struct EnvelopeCipher {
    keys: KeyRing,
}

impl EnvelopeCipher {
    pub fn new(keys: KeyRing) -> Self {
        Self { keys }
    }

    pub fn current_version(&self) -> u32 {
        self.keys.current_version()
    }

    /// Encrypt `plaintext` under a fresh DEK wrapped by master key
    /// `version` (the current version when `None`).
    pub fn encrypt(&self, plaintext: &[u8], version: Option<u32>) -> Result<EncryptedSecret> {
        let version = version.unwrap_or_else(|| self.keys.current_version());
        let master = self.keys.resolve(version)?;

        let mut dek = Zeroizing::new([0u8; DEK_LEN]);
        rand::rng().fill_bytes(&mut dek[..]);

        let ciphertext = encrypt(dek.as_slice(), plaintext, b"")?;
        let wrapped_key = encrypt(master.as_bytes(), dek.as_slice(), &wrap_aad(version))?;

        trace!(key_version = version, "sealed payload under fresh data key");

        Ok(EncryptedSecret {
            ciphertext,
            wrapped_key,
            key_version: version,
        })
    }

    /// Unwrap the DEK with master key `version` and decrypt `ciphertext`.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        wrapped_key: &[u8],
        version: u32,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let master = self.keys.resolve(version)?;

        let dek = Zeroizing::new(
            decrypt(master.as_bytes(), wrapped_key, &wrap_aad(version)).map_err(|_| {
                VaultError::Integrity(format!("wrapped key rejected by master key v{version}"))
            })?,
        );
        if dek.len() != DEK_LEN {
            return Err(VaultError::Integrity(
                "unwrapped data key has the wrong length".into(),
            ));
        }

        let plaintext = decrypt(dek.as_slice(), ciphertext, b"")
            .map_err(|_| VaultError::Integrity("ciphertext rejected by its data key".into()))?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Decrypt under `old_version` and re-encrypt under `new_version`
    /// (the current version when `None`).  The intermediate plaintext is
    /// never persisted and is wiped before returning.
    pub fn re_encrypt(
        &self,
        ciphertext: &[u8],
        wrapped_key: &[u8],
        old_version: u32,
        new_version: Option<u32>,
    ) -> Result<EncryptedSecret> {
        // Resolve the target first so a bad version fails before any decryption.
        let target = new_version.unwrap_or_else(|| self.keys.current_version());
        self.keys.resolve(target)?;

        let plaintext = self.decrypt(ciphertext, wrapped_key, old_version)?;
        self.encrypt(&plaintext, Some(target))
    }
}

fn wrap_aad(version: u32) -> Vec<u8> {
    format!("credvault-dek:v{version}").into_bytes()
}
