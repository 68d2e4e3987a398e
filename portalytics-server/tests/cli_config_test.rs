#![allow(deprecated)] // Command::cargo_bin, kept until the binary moves into the root package

use assert_cmd::Command;
use predicates::str::contains;

// Strip every PORTALYTICS_* variable so tests are hermetic regardless of the
// runner's environment.
fn portalytics_cmd() -> Command {
    let mut cmd = Command::cargo_bin("portalytics").unwrap();
    for var in [
        "PORTALYTICS_BACKEND_URL",
        "PORTALYTICS_MAX_CONNECTION_RETRIES",
        "PORTALYTICS_RETRY_DELAY_SECS",
        "PORTALYTICS_LOOKBACK_DAYS",
        "PORTALYTICS_PAGE_SIZE",
        "PORTALYTICS_DIRECTORY_URL",
        "PORTALYTICS_ANALYTICS_TARGET",
        "PORTALYTICS_WORKSPACE_TARGET",
        "PORTALYTICS_REQUEST_TIMEOUT_SECS",
        "PORTALYTICS_INTERVAL_SECS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn non_numeric_retry_ceiling_fails_at_startup() {
    portalytics_cmd()
        .env("PORTALYTICS_MAX_CONNECTION_RETRIES", "forever")
        .arg("once")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("PORTALYTICS_MAX_CONNECTION_RETRIES"));
}

#[test]
fn invalid_backend_url_fails_at_startup() {
    portalytics_cmd()
        .env("PORTALYTICS_BACKEND_URL", "localhost:9200")
        .arg("once")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("PORTALYTICS_BACKEND_URL"));
}

#[test]
fn unreachable_backend_exhausts_retries() {
    portalytics_cmd()
        .env("PORTALYTICS_BACKEND_URL", "http://127.0.0.1:1")
        .env("PORTALYTICS_MAX_CONNECTION_RETRIES", "1")
        .env("PORTALYTICS_RETRY_DELAY_SECS", "0")
        .arg("once")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("after 1 retries"));
}

#[test]
fn help_lists_subcommands() {
    portalytics_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("once"))
        .stdout(contains("attributes"));
}
