//! Shared E2E test helpers for `tessera` binary tests.

#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use std::path::Path;
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(20);

/// Environment variables read by the config loader.
const CONFIG_ENV_VARS: &[&str] = &[
    "TESSERA_DEBUG",
    "TESSERA_DEPLOYMENT_MODE",
    "TESSERA_EXECUTOR_ENABLED",
    "TESSERA_PUBLIC_CODE_EXECUTION",
    "RUST_LOG",
];

/// Build a Command for the `tessera` binary isolated from the host config.
///
/// Global config is skipped and the project root is a fresh temp dir.
/// Returns (command, _guard); keep the guard alive for the whole test.
pub fn tessera_cmd() -> (assert_cmd::Command, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create temp project dir");
    let cmd = tessera_cmd_in(tmp.path());
    (cmd, tmp)
}

/// Build a Command whose project root is `dir`.
pub fn tessera_cmd_in(dir: &Path) -> assert_cmd::Command {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("tessera");
    cmd.timeout(TIMEOUT_BASIC);
    for var in CONFIG_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.args(["--no-global-config", "-C", dir.to_str().expect("valid utf8")]);
    cmd
}

/// Caller flags for a member of tenant `acme`.
pub const TENANT_ACME: &[&str] = &["--principal", "alice", "--role", "tenant", "--tenant", "acme"];

/// Parses stdout as JSON.
pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}
