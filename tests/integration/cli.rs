use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn launcher() -> Command {
    let mut cmd = Command::cargo_bin("ambrosia-launcher").expect("binary should build");
    cmd.env_remove("RUST_LOG");
    cmd
}

const VALID_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[test]
fn secret_check_accepts_valid_mnemonic() {
    launcher()
        .args(["secret", "check", VALID_MNEMONIC])
        .assert()
        .success()
        .stdout(predicate::str::diff("valid\n"));
}

#[test]
fn secret_check_rejects_bad_checksum() {
    let words: Vec<&str> = std::iter::repeat_n("abandon", 12).collect();
    launcher()
        .args(["secret", "check"])
        .args(&words)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::diff("invalid\n"));
}

#[test]
fn dev_ports_are_fixed() {
    launcher()
        .args(["ports", "--dev"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("phoenixd: 9740")
                .and(predicate::str::contains("backend: 9154"))
                .and(predicate::str::contains("nextjs: 3000")),
        );
}

#[test]
fn init_writes_both_config_files() {
    let home = tempdir().unwrap();

    launcher()
        .args(["init", "--home"])
        .arg(home.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ambrosia.conf").and(predicate::str::contains("phoenix.conf")),
        );

    let ambrosia = fs::read_to_string(home.path().join(".Ambrosia-POS/ambrosia.conf")).unwrap();
    assert!(ambrosia.contains("secret="));
    assert!(ambrosia.contains("phoenixd-password="));
    assert!(home.path().join(".phoenix/phoenix.conf").exists());
}

#[test]
fn init_fails_with_missing_settings_file() {
    let home = tempdir().unwrap();

    launcher()
        .args(["init", "--home"])
        .arg(home.path())
        .arg("--config")
        .arg(home.path().join("missing.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.yaml"));
}

#[test]
fn logs_without_file_reports_missing_log() {
    let home = tempdir().unwrap();

    launcher()
        .args(["logs", "backend", "--home"])
        .arg(home.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("No log for service 'backend'"));
}

#[test]
fn logs_prints_tail_of_todays_file() {
    let home = tempdir().unwrap();
    let log_dir = home.path().join(".Ambrosia-POS/logs");
    fs::create_dir_all(&log_dir).unwrap();
    let today = chrono::Local::now().format("%Y-%m-%d");
    fs::write(
        log_dir.join(format!("nextjs-{today}.log")),
        "[t] [stdout] one\n[t] [stdout] two\n[t] [stdout] three\n",
    )
    .unwrap();

    launcher()
        .args(["logs", "nextjs", "-n", "2", "--home"])
        .arg(home.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("two")
                .and(predicate::str::contains("three"))
                .and(predicate::str::contains("one").not()),
        );
}
