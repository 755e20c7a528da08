//! Integration tests for the credvault vault module.

use serde_json::json;
use tempfile::TempDir;

use credvault::audit::{self, Actor, AuditAction, AuditFilter, Origin};
use credvault::crypto::{KeyRing, MasterKey};
use credvault::errors::VaultError;
use credvault::vault::{SecretInput, Vault};

fn ring(current: u32) -> KeyRing {
    KeyRing::new(
        current,
        [MasterKey::new(1, [0x11; 32]), MasterKey::new(2, [0x22; 32])],
    )
    .expect("valid ring")
}

/// Helper: open a file-backed vault inside a fresh temp dir.
fn open_vault(dir: &TempDir, current: u32) -> Vault {
    Vault::open(&dir.path().join("vault.db"), ring(current)).expect("open vault")
}

fn owner() -> Actor {
    Actor::new(1, Origin::cli())
}

fn history(vault: &Vault, secret_id: i64) -> Vec<AuditAction> {
    audit::history_for_secret(vault.store().connection(), secret_id)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect()
}

// ---------------------------------------------------------------------------
// End-to-end
// ---------------------------------------------------------------------------

#[test]
fn password_is_encrypted_at_rest_and_revealed_intact() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);

    let secret = vault
        .create(&owner(), SecretInput::normal("bank", "Tr0ub4dor&3"))
        .unwrap();
    let twin = vault
        .create(&owner(), SecretInput::normal("bank-copy", "Tr0ub4dor&3"))
        .unwrap();

    // Raw column holds neither the plaintext nor anything shorter than
    // nonce + tag.
    let raw: Vec<u8> = vault
        .store()
        .connection()
        .query_row(
            "SELECT password_ciphertext FROM secrets WHERE id = ?1",
            [secret.id],
            |row| row.get(0),
        )
        .unwrap();
    assert!(raw.len() >= 12 + 16 + "Tr0ub4dor&3".len());
    assert!(!raw.windows(11).any(|w| w == b"Tr0ub4dor&3"));

    // Same plaintext, fresh DEK and nonce: nothing stored is shared.
    let stored = |id: i64| -> (Vec<u8>, Vec<u8>) {
        vault
            .store()
            .connection()
            .query_row(
                "SELECT password_ciphertext, password_wrapped_key FROM secrets WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
    };
    let (first_ct, first_key) = stored(secret.id);
    let (second_ct, second_key) = stored(twin.id);
    assert_ne!(first_ct, second_ct);
    assert_ne!(first_key, second_key);

    let shown = vault.reveal(&owner(), &secret).unwrap();
    assert_eq!(shown.as_str(), "Tr0ub4dor&3");

    assert_eq!(
        history(&vault, secret.id),
        vec![AuditAction::Created, AuditAction::Viewed]
    );
}

#[test]
fn secrets_survive_reopening() {
    let dir = TempDir::new().unwrap();
    let id = {
        let mut vault = open_vault(&dir, 1);
        vault
            .create(&owner(), SecretInput::normal("mail", "letmein"))
            .unwrap()
            .id
    };

    let mut vault = open_vault(&dir, 1);
    let secret = vault.get(&owner(), id).unwrap();
    assert_eq!(vault.reveal(&owner(), &secret).unwrap().as_str(), "letmein");
}

#[test]
fn empty_password_round_trips() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);

    let secret = vault
        .create(&owner(), SecretInput::normal("placeholder", ""))
        .unwrap();
    assert!(secret.password_wrapped_key.is_none());
    assert_eq!(vault.reveal(&owner(), &secret).unwrap().as_str(), "");
}

// ---------------------------------------------------------------------------
// Audit coupling
// ---------------------------------------------------------------------------

#[test]
fn every_mutation_leaves_an_entry() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);
    let actor = owner();

    let folder = vault.create_folder(&actor, "servers").unwrap();
    let s = vault.create(&actor, SecretInput::normal("db", "pw")).unwrap();
    let s = vault
        .update(&actor, &s, SecretInput::from_record(&s).with_username("admin"))
        .unwrap();
    let (s, _) = vault.copy(&actor, &s).unwrap();
    vault.move_to_folder(&actor, &[s.id], Some(folder.id)).unwrap();
    vault.remove_from_folder(&actor, &[s.id]).unwrap();
    let s = vault.get(&actor, s.id).unwrap();
    vault.delete(&actor, &s).unwrap();

    assert_eq!(
        history(&vault, s.id),
        vec![
            AuditAction::Created,
            AuditAction::Updated,
            AuditAction::Copied,
            AuditAction::MovedToFolder,
            AuditAction::RemovedFromFolder,
            AuditAction::Deleted,
        ]
    );
}

#[test]
fn failed_audit_write_rolls_back_the_mutation() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);
    let s = vault.create(&owner(), SecretInput::normal("db", "pw")).unwrap();

    vault
        .store()
        .connection()
        .execute_batch(
            "CREATE TEMP TRIGGER audit_offline BEFORE INSERT ON audit_log
             BEGIN SELECT RAISE(ABORT, 'audit offline'); END;",
        )
        .unwrap();

    let created = vault.create(&owner(), SecretInput::normal("other", "pw"));
    assert!(matches!(created, Err(VaultError::Database(_))));

    let deleted = vault.delete(&owner(), &s);
    assert!(matches!(deleted, Err(VaultError::Database(_))));

    let copied = vault.copy(&owner(), &s);
    assert!(copied.is_err());

    let names: Vec<String> = vault
        .secret_names(&owner())
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["db"]);
    assert_eq!(vault.get(&owner(), s.id).unwrap().usage_count, 0);
}

#[test]
fn history_outlives_the_secret() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);

    let s = vault
        .create(&owner(), SecretInput::normal("retired-box", "pw"))
        .unwrap();
    vault.delete(&owner(), &s).unwrap();

    let page = vault
        .audit(
            &owner(),
            &AuditFilter {
                search: Some("retired".into()),
                ..AuditFilter::default()
            },
        )
        .unwrap();

    // Only the delete entry recorded the name; the created entry has no
    // live secret to join against anymore.
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].action, AuditAction::Deleted);
    assert_eq!(page.entries[0].secret_name.as_deref(), Some("retired-box"));
    assert_eq!(history(&vault, s.id).len(), 2);
}

#[test]
fn audit_is_scoped_to_the_actor() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);
    let alice = Actor::new(1, Origin::cli());
    let bob = Actor::new(2, Origin::system());

    vault.create(&alice, SecretInput::normal("a", "1")).unwrap();
    vault.create(&bob, SecretInput::normal("b", "2")).unwrap();

    let page = vault.audit(&alice, &AuditFilter::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].secret_name.as_deref(), Some("a"));
    assert_eq!(vault.list(&bob).unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Bulk operations
// ---------------------------------------------------------------------------

#[test]
fn bulk_delete_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);
    let alice = Actor::new(1, Origin::cli());
    let bob = Actor::new(2, Origin::cli());

    let a1 = vault.create(&alice, SecretInput::normal("a1", "x")).unwrap();
    let a2 = vault.create(&alice, SecretInput::normal("a2", "x")).unwrap();
    let b1 = vault.create(&bob, SecretInput::normal("b1", "x")).unwrap();

    let err = vault.destroy_bulk(&alice, &[a1.id, b1.id, a2.id]).unwrap_err();
    assert!(matches!(err, VaultError::Authorization { ref ids, .. } if ids == &vec![b1.id]));
    assert_eq!(vault.list(&alice).unwrap().len(), 2);

    let deleted = vault.destroy_bulk(&alice, &[a1.id, a2.id]).unwrap();
    assert_eq!(deleted, 2);
    assert!(vault.list(&alice).unwrap().is_empty());

    let page = vault
        .audit(
            &alice,
            &AuditFilter {
                action: Some(AuditAction::BulkDeleted),
                ..AuditFilter::default()
            },
        )
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.entries[0].timestamp, page.entries[1].timestamp);
}

#[test]
fn bulk_move_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);
    let alice = Actor::new(1, Origin::cli());
    let bob = Actor::new(2, Origin::cli());

    let folder = vault.create_folder(&alice, "servers").unwrap();
    let a1 = vault.create(&alice, SecretInput::normal("a1", "x")).unwrap();
    let b1 = vault.create(&bob, SecretInput::normal("b1", "x")).unwrap();
    let audited = |vault: &Vault| vault.audit(&alice, &AuditFilter::default()).unwrap().total;
    let before = audited(&vault);

    let err = vault
        .move_to_folder(&alice, &[a1.id, b1.id, 4242], Some(folder.id))
        .unwrap_err();
    assert!(
        matches!(err, VaultError::Authorization { ref ids, .. } if ids == &vec![b1.id, 4242])
    );

    let err = vault
        .move_to_folder(&alice, &[a1.id, 4242], Some(folder.id))
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { ref ids, .. } if ids == &vec![4242]));

    assert_eq!(vault.get(&alice, a1.id).unwrap().folder_id, None);
    assert_eq!(vault.get(&bob, b1.id).unwrap().folder_id, None);
    assert_eq!(audited(&vault), before);
    assert_eq!(history(&vault, b1.id), vec![AuditAction::Created]);
}

#[test]
fn moving_to_no_folder_records_null() {
    let dir = TempDir::new().unwrap();
    let mut vault = open_vault(&dir, 1);
    let s = vault.create(&owner(), SecretInput::normal("x", "1")).unwrap();

    vault.move_to_folder(&owner(), &[s.id], None).unwrap();

    let entries = audit::history_for_secret(vault.store().connection(), s.id).unwrap();
    assert_eq!(entries[1].metadata, Some(json!({ "folder_id": null })));
}

// ---------------------------------------------------------------------------
// Key rotation
// ---------------------------------------------------------------------------

#[test]
fn rotation_rewraps_old_records_and_keeps_content() {
    let dir = TempDir::new().unwrap();
    let ids: Vec<i64> = {
        let mut vault = open_vault(&dir, 1);
        ["one", "two", "three"]
            .iter()
            .map(|name| {
                vault
                    .create(&owner(), SecretInput::normal(*name, format!("{name}-pw")))
                    .unwrap()
                    .id
            })
            .collect()
    };

    let mut vault = open_vault(&dir, 2);
    vault.create(&owner(), SecretInput::normal("fresh", "new")).unwrap();

    let summary = vault.rotate_keys(&owner()).unwrap();
    assert_eq!(summary.rotated, 3);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.to_version, 2);

    for (id, name) in ids.iter().zip(["one", "two", "three"]) {
        let s = vault.get(&owner(), *id).unwrap();
        assert_eq!(s.password_key_version, Some(2));
        assert_eq!(
            vault.reveal(&owner(), &s).unwrap().as_str(),
            format!("{name}-pw")
        );
    }

    let entries = audit::history_for_secret(vault.store().connection(), ids[0]).unwrap();
    assert_eq!(
        entries[1].metadata,
        Some(json!({ "reason": "key_rotation", "from_version": 1, "to_version": 2 }))
    );

    let again = vault.rotate_keys(&owner()).unwrap();
    assert_eq!(again.rotated, 0);
}

#[test]
fn missing_old_key_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let id = {
        let mut vault = open_vault(&dir, 1);
        vault
            .create(&owner(), SecretInput::normal("old", "pw"))
            .unwrap()
            .id
    };

    let only_v2 = KeyRing::new(2, [MasterKey::new(2, [0x22; 32])]).unwrap();
    let mut vault = Vault::open(&dir.path().join("vault.db"), only_v2).unwrap();
    let s = vault.get(&owner(), id).unwrap();

    assert!(matches!(
        vault.reveal(&owner(), &s),
        Err(VaultError::Configuration(_))
    ));
    assert!(matches!(
        vault.rotate_keys(&owner()),
        Err(VaultError::Configuration(_))
    ));
}
