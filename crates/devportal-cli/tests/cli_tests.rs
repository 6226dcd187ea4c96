//! Integration tests for the `devportal` CLI binary.
//!
//! These run the CLI as a subprocess against an address nothing listens
//! on, so they cover argument handling, local validation and the saved
//! session file without a portal backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::process::Command;

const UNREACHABLE_URL: &str = "http://127.0.0.1:19999";

/// Unsigned JWT for `dev@example.com`; only its claims are read locally.
const ID_TOKEN: &str = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.\
                        eyJzdWIiOiJ1LTEiLCJ1c2VyX2lkIjoidS0xIiwiZW1haWwiOiJkZXZAZXhhbXBsZS5jb20ifQ.\
                        c2ln";

/// Helper: locate the `devportal` binary built by `cargo test`.
fn devportal_bin() -> String {
    let path = env!("CARGO_BIN_EXE_devportal");
    assert!(
        Path::new(path).exists(),
        "devportal binary not found at {path}"
    );
    path.to_owned()
}

/// Helper: run devportal with a private state directory and return
/// (`exit_code`, stdout, stderr).
fn run(state_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(devportal_bin())
        .args(args)
        .env("DEVPORTAL_URL", UNREACHABLE_URL)
        .env("DEVPORTAL_STATE_DIR", state_dir)
        .env("DEVPORTAL_TIMEOUT_SECS", "5")
        .env_remove("DEVPORTAL_ID_TOKEN")
        .env_remove("DEVPORTAL_REFRESH_TOKEN")
        .env_remove("DEVPORTAL_FIREBASE_API_KEY")
        .env_remove("DEVPORTAL_UNAUTHORIZED_POLICY")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute devportal");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn write_session(state_dir: &Path, base_url: &str) {
    let json = format!(
        r#"{{"base_url":"{base_url}","id_token":"{ID_TOKEN}"}}"#
    );
    fs::write(state_dir.join("session.json"), json).unwrap();
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["--version"]);
    assert_eq!(code, 0, "devportal --version should exit 0");
    assert!(
        stdout.contains("devportal"),
        "version output should contain 'devportal': {stdout}"
    );
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["--help"]);
    assert_eq!(code, 0);
    for cmd in ["login", "logout", "register", "whoami", "products", "apps", "certs"] {
        assert!(stdout.contains(cmd), "help should list '{cmd}': {stdout}");
    }
    assert!(stdout.contains("DEVPORTAL_URL"), "help should list env vars");
}

#[test]
fn test_subcommand_help() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["apps", "--help"]);
    assert_eq!(code, 0);
    for cmd in ["list", "show", "create", "delete"] {
        assert!(stdout.contains(cmd), "apps help should list '{cmd}': {stdout}");
    }

    let (code, stdout, _) = run(dir.path(), &["certs", "--help"]);
    assert_eq!(code, 0);
    for cmd in ["issue", "upload", "delete"] {
        assert!(stdout.contains(cmd), "certs help should list '{cmd}': {stdout}");
    }
}

#[test]
fn test_unknown_command_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["frobnicate"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("frobnicate"), "{stderr}");
}

// ── Session file ─────────────────────────────────────────────────────

#[test]
fn test_whoami_without_session() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["whoami"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not signed in"), "{stderr}");
}

#[test]
fn test_logout_without_session_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["logout"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Already signed out"), "{stdout}");
}

#[test]
fn test_logout_removes_saved_session() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), UNREACHABLE_URL);

    // The backend is unreachable; the local session is dropped regardless.
    let (code, stdout, _) = run(dir.path(), &["logout"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Signed out"), "{stdout}");
    assert!(!dir.path().join("session.json").exists());
}

#[test]
fn test_corrupt_session_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("session.json"), "{ not json").unwrap();
    let (code, _, stderr) = run(dir.path(), &["whoami"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("corrupt session file"), "{stderr}");
}

#[test]
fn test_corrupt_cookie_jar_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        r#"{{"base_url":"{UNREACHABLE_URL}","cookies":"not a jar","id_token":"{ID_TOKEN}"}}"#
    );
    fs::write(dir.path().join("session.json"), json).unwrap();
    let (code, _, stderr) = run(dir.path(), &["whoami"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("corrupt cookie jar"), "{stderr}");
}

#[test]
fn test_session_for_other_backend_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), "https://portal.example.com");
    let (code, _, stderr) = run(dir.path(), &["products"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("saved session belongs to"), "{stderr}");
}

// ── Login ────────────────────────────────────────────────────────────

#[test]
fn test_login_requires_a_token() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["login"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("--id-token or --refresh-token"), "{stderr}");
}

#[test]
fn test_login_with_refresh_token_needs_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["login", "--refresh-token", "rt-1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("refresh-token sign-in"), "{stderr}");
}

#[test]
fn test_login_rejects_malformed_id_token() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["login", "--id-token", "not-a-jwt"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("invalid ID token"), "{stderr}");
}

#[test]
fn test_login_against_unreachable_backend_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["login", "--id-token", ID_TOKEN]);
    assert_eq!(code, 1);
    assert!(stderr.contains("sign-in failed"), "{stderr}");
    assert!(!dir.path().join("session.json").exists());
}

// ── Local validation ─────────────────────────────────────────────────

#[test]
fn test_upload_rejects_wrong_extension() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("key.txt");
    fs::write(&key, "-----BEGIN CERTIFICATE-----\n").unwrap();

    // Rejected before any session is needed.
    let (code, _, stderr) = run(dir.path(), &["certs", "upload", key.to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Invalid file type"), "{stderr}");
}

#[test]
fn test_create_app_without_products() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), UNREACHABLE_URL);

    let (code, _, stderr) = run(dir.path(), &["apps", "create", "billing"]);
    assert_eq!(code, 1);
    assert!(
        stderr.contains("Please select at least one API Product."),
        "{stderr}"
    );
    // Validation failed locally, so the session is still live and kept.
    assert!(dir.path().join("session.json").exists());
}
