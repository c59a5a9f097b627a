//! Persisted session artifact.
//!
//! The artifact lets a restarted process reuse a previous login: it records a
//! fingerprint of the credentials and the identity they resolved to. A
//! missing or unreadable artifact just means "log in again".

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::messenger::Identity;

/// On-disk form of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArtifact {
    /// Hex SHA-256 of the credentials the session was created with.
    pub token_fingerprint: String,
    pub user_id: i64,
    pub username: Option<String>,
    /// Unix seconds.
    pub created_at: u64,
}

impl SessionArtifact {
    pub fn new(token_fingerprint: String, identity: &Identity, created_at: SystemTime) -> Self {
        Self {
            token_fingerprint,
            user_id: identity.user_id,
            username: identity.username.clone(),
            created_at: created_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            username: self.username.clone(),
        }
    }
}

/// JSON file holding at most one [`SessionArtifact`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the artifact; absent or corrupt files yield `None`.
    pub async fn load(&self) -> Option<SessionArtifact> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read session artifact");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt session artifact");
                None
            }
        }
    }

    /// Writes the artifact through a temporary file and a rename.
    pub async fn save(&self, artifact: &SessionArtifact) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(artifact).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            user_id: 7,
            username: Some("owner".into()),
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested/session.json"));
        let artifact = SessionArtifact::new("abc".into(), &identity(), SystemTime::now());

        store.save(&artifact).await.unwrap();
        assert_eq!(store.load().await, Some(artifact));
    }

    #[tokio::test]
    async fn missing_and_corrupt_files_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        assert_eq!(store.load().await, None);

        tokio::fs::write(store.path(), b"{not json").await.unwrap();
        assert_eq!(store.load().await, None);
    }
}
