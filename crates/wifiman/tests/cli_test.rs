//! Integration tests for the `wifiman` CLI binary.
//!
//! Every test runs against a simulated radio and a vault inside its own
//! temporary directory, so nothing touches the user's real config.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

// ── Helpers ─────────────────────────────────────────────────────────

const NEIGHBOURHOOD: &str = r#"
[simulated]
latency_ms = 0
jitter_dbm = 0

[[simulated.networks]]
ssid = "Cafe"
signal_dbm = -40
security = "open"

[[simulated.networks]]
ssid = "Office"
signal_dbm = -30
security = "wpa2_personal"
password = "pw1"

[[simulated.networks]]
ssid = "Home"
signal_dbm = -50
security = "wpa3_personal"
password = "home-pw"
"#;

struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let body = format!(
            "[vault]\ndata_dir = \"{}\"\n{NEIGHBOURHOOD}",
            data.display().to_string().replace('\\', "\\\\")
        );
        std::fs::write(dir.path().join("config.toml"), body).unwrap();
        Self { dir }
    }

    fn data(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("wifiman");
        let root: &Path = self.dir.path();
        cmd.env("HOME", root)
            .env("XDG_CONFIG_HOME", root.join("xdg-config"))
            .env("XDG_DATA_HOME", root.join("xdg-data"))
            .env("WIFIMAN_CONFIG", root.join("config.toml"))
            .env_remove("WIFIMAN_OUTPUT")
            .env_remove("WIFIMAN_TIMEOUT")
            .env_remove("WIFIMAN_PASSPHRASE")
            .env_remove("RUST_LOG")
            .write_stdin("");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(["-o", "json"]).args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let sandbox = Sandbox::new();
    let output = sandbox.cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    Sandbox::new().cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("networks")
            .and(predicate::str::contains("password"))
            .and(predicate::str::contains("serve")),
    );
}

#[test]
fn test_completions_zsh() {
    Sandbox::new()
        .cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_invalid_output_format() {
    let output = Sandbox::new()
        .cmd()
        .args(["--output", "xml", "status"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("possible values"));
}

// ── Networks ────────────────────────────────────────────────────────

#[test]
fn test_list_is_strongest_first() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["-o", "plain", "networks", "list"])
        .assert()
        .success()
        .stdout("Office\nCafe\nHome\n");
}

#[test]
fn test_open_network_connects() {
    let sandbox = Sandbox::new();
    let record = sandbox.json(&["networks", "connect", "Cafe"]);
    assert_eq!(record["connectionState"], "connected");
    let list = sandbox.json(&["password", "list"]);
    assert!(list.as_array().unwrap().is_empty(), "open networks store nothing");
}

#[test]
fn test_connect_saves_password_for_next_run() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["networks", "connect", "Office", "--password", "pw1"])
        .assert()
        .success();

    sandbox
        .cmd()
        .args(["-o", "plain", "password", "list"])
        .assert()
        .success()
        .stdout("Office\n");

    // A later run connects with the stored credential.
    let record = sandbox.json(&["networks", "connect", "Office"]);
    assert_eq!(record["connectionState"], "connected");

    let raw = std::fs::read_to_string(sandbox.data().join("vault.json")).unwrap();
    assert!(raw.contains("Office"));
    assert!(!raw.contains("pw1"), "vault must hold ciphertext only");
}

#[test]
fn test_password_required_exit_code() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .cmd()
        .args(["-o", "json", "networks", "connect", "Home"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["error"]["code"], "PASSWORD_REQUIRED");
}

#[test]
fn test_wrong_password_is_not_saved() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["networks", "connect", "Office", "-p", "nope"])
        .assert()
        .code(3);
    let list = sandbox.json(&["password", "list"]);
    assert!(list.as_array().unwrap().is_empty());
}

#[test]
fn test_unknown_network_exit_code() {
    Sandbox::new()
        .cmd()
        .args(["networks", "disconnect", "Ghost"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Ghost"));
}

#[test]
fn test_favorite_toggle() {
    let sandbox = Sandbox::new();
    let out = sandbox.json(&["networks", "favorite", "Home", "--toggle"]);
    assert_eq!(out["favorite"], true);
}

// ── Passwords ───────────────────────────────────────────────────────

#[test]
fn test_password_round_trip() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["password", "save", "Home", "-p", "home-pw"])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["-o", "plain", "password", "get", "Home"])
        .assert()
        .success()
        .stdout("home-pw\n");

    let audit = sandbox.json(&["password", "audit"]);
    assert_eq!(audit["readable"][0]["ssid"], "Home");
    assert!(audit["corrupt"].as_array().unwrap().is_empty());

    for _ in 0..2 {
        sandbox
            .cmd()
            .args(["-y", "password", "delete", "Home"])
            .assert()
            .success();
    }
    let got = sandbox.json(&["password", "get", "Home"]);
    assert!(got["password"].is_null());
}

#[test]
fn test_delete_without_yes_needs_a_terminal() {
    Sandbox::new()
        .cmd()
        .args(["password", "delete", "Home"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_key_makes_vault_unavailable() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["password", "save", "Office", "-p", "pw1"])
        .assert()
        .success();
    std::fs::remove_file(sandbox.data().join("master.key")).unwrap();

    sandbox
        .cmd()
        .args(["password", "list"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("key"));
    assert!(
        !sandbox.data().join("master.key").exists(),
        "a replacement key must not be minted"
    );

    let status = sandbox.json(&["status"]);
    assert_eq!(status["credentials"]["available"], false);
}

// ── Serve ───────────────────────────────────────────────────────────

#[test]
fn test_serve_answers_each_line() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .cmd()
        .arg("serve")
        .write_stdin(concat!(
            r#"{"id":1,"command":"connect","params":{"ssid":"Cafe"}}"#,
            "\n",
            r#"{"id":2,"command":"listPasswords"}"#,
            "\n",
            "garbage\n",
        ))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let replies: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 3);

    let by_id = |id: i64| replies.iter().find(|r| r["id"] == id).unwrap();
    assert_eq!(by_id(1)["data"]["connectionState"], "connected");
    assert_eq!(by_id(2)["ok"], true);
    let bad = replies.iter().find(|r| r.get("id").is_none()).unwrap();
    assert_eq!(bad["error"]["code"], "INVALID_REQUEST");
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_and_path() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[manager]"));

    let paths = sandbox.json(&["config", "path"]);
    assert_eq!(
        paths["vault"],
        sandbox.data().join("vault.json").display().to_string()
    );
}

#[test]
fn test_invalid_config_is_reported() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.dir.path().join("config.toml"),
        "[manager]\nconnect_timeout_secs = 0\n",
    )
    .unwrap();
    sandbox
        .cmd()
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("connect_timeout_secs"));
}
