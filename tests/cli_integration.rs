//! Integration tests for the credvault CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`, each in
//! its own temp directory with master keys supplied through the
//! environment.  Passwords are passed with `--password` or piped on
//! stdin; nothing here needs a terminal or a clipboard.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const KEY_V1: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";
const KEY_V2: &str = "AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=";

/// Helper: a credvault command running in `dir` with key v1 configured.
fn credvault(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("credvault").expect("binary should exist");
    cmd.current_dir(dir.path())
        .env_remove("CREDVAULT_OWNER")
        .env_remove("CREDVAULT_LOG")
        .env_remove("CREDVAULT_KEY_VERSION")
        .env_remove("CREDVAULT_MASTER_KEY_2")
        .env("CREDVAULT_MASTER_KEY_1", KEY_V1);
    cmd
}

fn add(dir: &TempDir, name: &str, password: &str) {
    credvault(dir)
        .args(["add", name, "--password", password])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// Basics
// ---------------------------------------------------------------------------

#[test]
fn help_flag_shows_usage() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("credential vault"))
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("copy"))
        .stdout(predicate::str::contains("rotate"))
        .stdout(predicate::str::contains("audit"));
}

#[test]
fn no_args_shows_help() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn actions_lists_every_audit_action() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .arg("actions")
        .assert()
        .success()
        .stdout(predicate::str::contains("bulk_deleted"))
        .stdout(predicate::str::contains("Removed from folder"));
}

#[test]
fn keygen_prints_an_env_assignment() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .args(["keygen", "--key-version", "3"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"CREDVAULT_MASTER_KEY_3=[A-Za-z0-9+/]{43}=").unwrap());
}

#[test]
fn missing_master_key_fails_with_configuration_error() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .env_remove("CREDVAULT_MASTER_KEY_1")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn malformed_master_key_fails() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .env("CREDVAULT_MASTER_KEY_1", "dG9vIHNob3J0")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn keys_can_come_from_the_config_file() {
    let dir = TempDir::new().unwrap();
    dir.child(".credvault.toml")
        .write_str(&format!(
            "database = \"data/vault.db\"\n[master_keys]\n\"1\" = \"{KEY_V1}\"\n"
        ))
        .unwrap();

    credvault(&dir)
        .env_remove("CREDVAULT_MASTER_KEY_1")
        .args(["add", "mail", "--password", "pw"])
        .assert()
        .success();

    dir.child("data/vault.db").assert(predicate::path::exists());
}

// ---------------------------------------------------------------------------
// Secret lifecycle
// ---------------------------------------------------------------------------

#[test]
fn add_then_copy_to_stdout() {
    let dir = TempDir::new().unwrap();
    add(&dir, "bank", "Tr0ub4dor&3");

    credvault(&dir)
        .args(["copy", "bank", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tr0ub4dor&3"));

    credvault(&dir)
        .arg("audit")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"))
        .stdout(predicate::str::contains("Copied"))
        .stdout(predicate::str::contains("cli"));
}

#[test]
fn password_can_be_piped() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .args(["add", "piped"])
        .write_stdin("from-stdin\n")
        .assert()
        .success();

    credvault(&dir)
        .args(["show", "piped", "--reveal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-stdin"));
}

#[test]
fn list_never_prints_passwords_and_masks_long_names() {
    let dir = TempDir::new().unwrap();
    add(
        &dir,
        "This is a very long password name that should be masked",
        "sup3r-s3cret",
    );

    credvault(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("This is ********e masked"))
        .stdout(predicate::str::contains("sup3r-s3cret").not());
}

#[test]
fn ssh_connection_string_fills_username_and_host() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .args([
            "add",
            "prod",
            "--ssh",
            "--connection",
            "ssh  admin@203.0.113.5",
            "--password",
            "pw",
        ])
        .assert()
        .success();

    credvault(&dir)
        .args(["show", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("admin"))
        .stdout(predicate::str::contains("203.0.113.5"));
}

#[test]
fn ssh_without_target_reports_both_fields() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .args(["add", "prod", "--ssh", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("username: is required"))
        .stderr(predicate::str::contains("host: is required"));
}

#[test]
fn connection_without_ssh_is_rejected() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .args(["add", "mail", "--connection", "admin@203.0.113.5", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("connection: only applies to ssh secrets"));

    add(&dir, "web", "pw");
    credvault(&dir)
        .args(["edit", "web", "--connection", "admin@203.0.113.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("connection: only applies to ssh secrets"));
}

#[test]
fn out_of_range_dates_are_refused_and_the_vault_stays_readable() {
    let dir = TempDir::new().unwrap();
    credvault(&dir)
        .args(["add", "far", "--password", "pw", "--expires", "+10000-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid date"));

    add(&dir, "near", "pw");
    credvault(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("near"))
        .stdout(predicate::str::contains("far").not());

    credvault(&dir)
        .args(["audit", "--to", "+262142-12-31"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid date"));

    credvault(&dir)
        .args(["audit", "--from", "0000-01-01", "--to", "9999-12-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 entries)"));
}

#[test]
fn duplicate_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    add(&dir, "mail", "a");

    credvault(&dir)
        .args(["add", "mail", "--password", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in use"));
}

#[test]
fn edit_changes_password() {
    let dir = TempDir::new().unwrap();
    add(&dir, "mail", "old-pw");

    credvault(&dir)
        .args(["edit", "mail", "--password", "new-pw", "--rename", "email"])
        .assert()
        .success();

    credvault(&dir)
        .args(["copy", "email", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new-pw"));
}

#[test]
fn owners_do_not_see_each_other() {
    let dir = TempDir::new().unwrap();
    add(&dir, "mine", "pw");

    credvault(&dir)
        .args(["--owner", "2", "copy", "mine", "--stdout"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No secret named 'mine'"));
}

#[test]
fn deleting_several_names_is_one_batch() {
    let dir = TempDir::new().unwrap();
    add(&dir, "a", "1");
    add(&dir, "b", "2");

    credvault(&dir)
        .args(["delete", "a", "b", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 2 secrets"));

    credvault(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No secrets"));

    credvault(&dir)
        .args(["audit", "--action", "bulk_deleted"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bulk deleted"))
        .stdout(predicate::str::contains("(2 entries)"));
}

#[test]
fn folders_move_and_unfile() {
    let dir = TempDir::new().unwrap();
    add(&dir, "db", "1");

    credvault(&dir)
        .args(["folder", "add", "servers"])
        .assert()
        .success();

    credvault(&dir)
        .args(["move", "--folder", "servers", "db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved 1 secret(s) to 'servers'"));

    credvault(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("servers"));

    credvault(&dir)
        .args(["unfile", "db"])
        .assert()
        .success();

    credvault(&dir)
        .args(["audit", "--search", "folder"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved to folder"))
        .stdout(predicate::str::contains("Removed from folder"));
}

// ---------------------------------------------------------------------------
// Key rotation
// ---------------------------------------------------------------------------

#[test]
fn rotate_moves_secrets_to_the_new_key() {
    let dir = TempDir::new().unwrap();
    add(&dir, "legacy", "keep-me");

    credvault(&dir)
        .env("CREDVAULT_MASTER_KEY_2", KEY_V2)
        .env("CREDVAULT_KEY_VERSION", "2")
        .arg("rotate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Re-encrypted 1 secret(s) under key version 2"));

    // v1 can now be retired.
    credvault(&dir)
        .env_remove("CREDVAULT_MASTER_KEY_1")
        .env("CREDVAULT_MASTER_KEY_2", KEY_V2)
        .env("CREDVAULT_KEY_VERSION", "2")
        .args(["copy", "legacy", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keep-me"));
}
