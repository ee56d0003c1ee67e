use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::message::AuthUser;

/// Signed-in user as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub user: AuthUser,
    pub saved_at: DateTime<Utc>,
}

/// Keeps the sign-in alive across runs
#[derive(Debug, Clone)]
pub struct SessionManager {
    path: PathBuf,
}

impl SessionManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session, if any.
    ///
    /// A corrupt file is treated as "signed out" rather than an error.
    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        match serde_json::from_str::<StoredSession>(&content) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                tracing::warn!("Ignoring unreadable session file {}: {err}", self.path.display());
                Ok(None)
            }
        }
    }

    /// Save session to disk
    pub fn save(&self, user: &AuthUser) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create session directory")?;
        }

        let session = StoredSession {
            user: user.clone(),
            saved_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&session)
            .context("Failed to serialize session")?;
        let mut file = open_private(&self.path)
            .context("Failed to open session file")?;
        file.write_all(content.as_bytes())
            .context("Failed to write session file")?;
        Ok(())
    }

    /// Forget the stored session
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Open for writing, truncated, readable by the owner only
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; tighten a file left by an older run
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            uid: "uid-1".into(),
            email: "kid@example.com".into(),
            display_name: None,
            photo_url: None,
            id_token: "id".into(),
            refresh_token: "refresh".into(),
            expires_at: None,
        }
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path().join("nested").join("session.json"));
        assert!(sessions.load().unwrap().is_none());

        sessions.save(&user()).unwrap();
        let stored = sessions.load().unwrap().unwrap();
        assert_eq!(stored.user, user());

        sessions.clear().unwrap();
        assert!(sessions.load().unwrap().is_none());
        sessions.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let sessions = SessionManager::new(&path);
        sessions.save(&user()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // A pre-existing world-readable file is tightened and overwritten
        fs::write(&path, "x".repeat(4096)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        sessions.save(&user()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(sessions.load().unwrap().unwrap().user, user());
    }

    #[test]
    fn test_corrupt_file_is_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();
        assert!(SessionManager::new(path).load().unwrap().is_none());
    }
}
