//! Cryptographic primitives for credvault.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - Versioned master keys and the key ring (`keyring`)
//! - Envelope encryption with per-record data keys (`envelope`)

pub mod encryption;
pub mod envelope;
pub mod keyring;

pub use envelope::{EncryptedSecret, EnvelopeCipher};
pub use keyring::{generate_master_key, KeyRing, MasterKey};
