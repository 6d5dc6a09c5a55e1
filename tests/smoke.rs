//! Smoke tests -- verify the binary runs and its subcommands parse.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("speedscout")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("lowest-latency speed test server"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("speedscout")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("speedscout"));
}

#[test]
fn test_select_subcommand_exists() {
    Command::cargo_bin("speedscout")
        .unwrap()
        .args(["select", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--server"));
}

#[test]
fn test_list_subcommand_exists() {
    Command::cargo_bin("speedscout")
        .unwrap()
        .args(["list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_invalid_source_address_rejected() {
    Command::cargo_bin("speedscout")
        .unwrap()
        .args(["select", "--source", "not-an-ip"])
        .assert()
        .failure();
}

#[test]
fn test_missing_config_file_fails() {
    Command::cargo_bin("speedscout")
        .unwrap()
        .args(["--config", "/nonexistent/speedscout.toml", "select"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to read config file"));
}
