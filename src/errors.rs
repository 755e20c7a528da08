use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can occur in credvault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Key material ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file error: {0}")]
    Config(String),

    #[error("Config file not found at {0}")]
    ConfigNotFound(PathBuf),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    // --- Operation errors ---
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Not permitted to act on {entity} {}", join_ids(.ids))]
    Authorization { entity: &'static str, ids: Vec<i64> },

    #[error("No {entity} with id {}", join_ids(.ids))]
    NotFound { entity: &'static str, ids: Vec<i64> },

    #[error("No {entity} named '{name}'")]
    NamedNotFound { entity: &'static str, name: String },

    #[error("Secret {0} was modified concurrently, reload and retry")]
    Conflict(i64),

    // --- Storage errors ---
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl VaultError {
    /// Shorthand for a missing secret.
    pub fn secret_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "secret",
            ids: vec![id],
        }
    }

    /// Shorthand for acting on a secret owned by someone else.
    pub fn secret_forbidden(id: i64) -> Self {
        Self::Authorization {
            entity: "secret",
            ids: vec![id],
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field-level problem found while validating one input.
///
/// Validation never stops at the first failure; callers get the full list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|e| e.field).collect()
    }

    /// Turn the collected problems into a result.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(VaultError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Convenience type alias for credvault results.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_list_every_field() {
        let mut errs = ValidationErrors::new();
        errs.add("username", "is required");
        errs.add("host", "is required");

        let err = errs.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: username: is required; host: is required"
        );
    }

    #[test]
    fn empty_validation_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn authorization_enumerates_ids() {
        let err = VaultError::Authorization {
            entity: "secret",
            ids: vec![3, 9, 12],
        };
        assert_eq!(err.to_string(), "Not permitted to act on secret 3, 9, 12");
    }
}
