//! Helpers for running the `mgplan` binary in integration tests.
use assert_cmd::cargo_bin_cmd;

/// Run `mgplan` with default settings and check that it exits successfully
#[allow(dead_code)]
pub fn assert_mgplan_runs(args: &[&str]) {
    cargo_bin_cmd!("mgplan")
        .env("MGPLAN_USE_DEFAULT_SETTINGS", "1")
        .args(args)
        .assert()
        .success();
}

/// Run `mgplan` with default settings and check that it fails
#[allow(dead_code)]
pub fn assert_mgplan_fails(args: &[&str]) {
    cargo_bin_cmd!("mgplan")
        .env("MGPLAN_USE_DEFAULT_SETTINGS", "1")
        .args(args)
        .assert()
        .failure();
}

/// Run `mgplan` with default settings and return what it printed to stdout
#[allow(dead_code)]
pub fn get_mgplan_stdout(args: &[&str]) -> String {
    let output = cargo_bin_cmd!("mgplan")
        .env("MGPLAN_USE_DEFAULT_SETTINGS", "1")
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success());

    String::from_utf8(output.stdout).unwrap()
}
