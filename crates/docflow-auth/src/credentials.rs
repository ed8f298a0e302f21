//! Credential storage for the DocFlow session
//!
//! Manages a JSON file holding the current session's token pair. All writes
//! use atomic temp-file + rename to prevent corruption on crash. A tokio
//! Mutex serializes concurrent writes from request-time refresh and session
//! teardown.
//!
//! The credential file is the single source of truth for token data. The
//! client reads it at request time; only the refresh coordinator writes new
//! tokens or clears the session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The current session's token pair.
///
/// `access_expires` and `refresh_expires` are unix timestamps in
/// milliseconds (absolute, not deltas). Computed at storage time from the
/// refresh endpoint's `expires_in` / `refresh_expires_in` second deltas
/// plus the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Current access token (Bearer token for API calls)
    pub access: String,
    /// Refresh token for minting new access tokens
    pub refresh: String,
    /// Access token expiration, unix millis
    pub access_expires: u64,
    /// Refresh token expiration, unix millis
    pub refresh_expires: u64,
}

/// Thread-safe credential file manager.
///
/// The Mutex serializes all writes. Reads acquire the lock briefly to clone
/// the in-memory state, so request-time reads don't block on refresh writes.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<Option<Credentials>>,
}

impl CredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it holding no session (cold start
    /// before the first sign-in). A corrupt file is an error rather than a
    /// silent empty session.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let credentials: Option<Credentials> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(
                path = %path.display(),
                session = credentials.is_some(),
                "loaded credentials"
            );
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting without a session");
            // Create the empty file so future loads don't need the cold-start path
            write_atomic(&path, &None).await?;
            None
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of the stored credentials, if a session exists.
    pub async fn get(&self) -> Option<Credentials> {
        let state = self.state.lock().await;
        state.clone()
    }

    /// Current access token, if a session exists.
    pub async fn access_token(&self) -> Option<String> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|c| c.access.clone())
            .filter(|t| !t.is_empty())
    }

    /// Current refresh token. `None` when no session is stored or the
    /// session has no refresh token (bootstrap tokens).
    pub async fn refresh_token(&self) -> Option<String> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|c| c.refresh.clone())
            .filter(|t| !t.is_empty())
    }

    /// Replace the stored credentials and persist to disk.
    pub async fn save(&self, credentials: Credentials) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = Some(credentials);
        debug!("saved credentials");
        write_atomic(&self.path, &state).await
    }

    /// Drop the session entirely and persist the empty state.
    ///
    /// Called on unrecoverable auth failure; the next sign-in repopulates
    /// the store.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = None;
        debug!("cleared credentials");
        write_atomic(&self.path, &state).await
    }

    /// Whether no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_none()
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. This prevents corruption if the process crashes mid-write.
/// Sets file permissions to 0600 (owner read/write only) since the file
/// contains session tokens.
async fn write_atomic(path: &Path, data: &Option<Credentials>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
