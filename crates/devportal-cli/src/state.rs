//! Persisted sign-in state.
//!
//! The backend session cookie and the identity credential are kept in
//! `session.json` under the state directory so that one `devportal login`
//! serves later invocations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const SESSION_FILE: &str = "session.json";

/// Everything needed to resume a session in a new process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Backend the session belongs to.
    pub base_url: String,
    /// Backend cookie jar as saved by `SessionCookieJar::to_json`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cookies: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// `~/.devportal`, falling back to `USERPROFILE` on Windows.
pub fn default_state_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".devportal"))
        .context("cannot determine home directory (HOME / USERPROFILE not set)")
}

pub fn session_path(dir: &Path) -> PathBuf {
    dir.join(SESSION_FILE)
}

/// Load the saved session, `None` if there is none.
pub fn load(dir: &Path) -> Result<Option<SessionState>> {
    let path = session_path(dir);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let state = serde_json::from_str(&text)
        .with_context(|| format!("corrupt session file {}; run `devportal logout`", path.display()))?;
    Ok(Some(state))
}

/// Write the session, readable by the owner only on Unix.
pub fn save(dir: &Path, state: &SessionState) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = session_path(dir);
    let json = serde_json::to_string_pretty(state).context("failed to encode session")?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

/// Delete the saved session. Returns whether one existed.
pub fn remove(dir: &Path) -> Result<bool> {
    let path = session_path(dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
