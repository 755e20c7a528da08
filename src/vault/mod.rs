//! Secret storage: records, SSH parsing, SQLite persistence and the
//! audited operations that tie them together.

pub mod operations;
pub mod secret;
pub mod ssh;
pub mod store;

pub use operations::{RotationSummary, Vault};
pub use secret::{mask_name, SecretInput, SecretKind, SecretRecord, SecretSummary};
pub use store::{Folder, Store};
