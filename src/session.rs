use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::JournalError;
use crate::remote::atomic_write;

/// The logged-in user. The password stays in memory because every save and
/// load derives the cipher key from it.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    pub username: String,
    pub password: String,
}

impl Session {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Shared slot holding the current session, read by the save scheduler.
#[derive(Clone, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionSlot {
    pub fn set(&self, session: Session) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(session);
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn require(&self) -> crate::Result<Session> {
        self.current().ok_or(JournalError::NoSession)
    }

    pub fn username(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.username.clone())
    }
}

/// Client-side mirror of the session used to resume on the next start.
///
/// The password is stored in plain text next to the session marker, so the
/// file is only as safe as the permissions of the data directory.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, session: &Session) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| JournalError::FileSystem(e.to_string()))?;
        }
        let data = serde_json::to_vec(session)?;
        atomic_write(&self.path, &data)
    }

    pub fn load(&self) -> Option<Session> {
        let data = fs::read(&self.path).ok()?;
        match serde_json::from_slice::<Session>(&data) {
            Ok(session) if !session.username.is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring unreadable stored credentials: {}", e);
                None
            }
        }
    }

    pub fn clear(&self) -> crate::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JournalError::FileSystem(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_credentials_roundtrip_and_clear() {
        let tmp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(tmp_dir.path().join("nested").join("session.json"));
        assert!(store.load().is_none());

        store.save(&Session::new("alice", "pw123")).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.password, "pw123");

        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_debug_output_hides_password() {
        let rendered = format!("{:?}", Session::new("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_slot_requires_a_session() {
        let slot = SessionSlot::default();
        assert!(matches!(slot.require(), Err(JournalError::NoSession)));
        slot.set(Session::new("bob", "pw"));
        assert_eq!(slot.username().as_deref(), Some("bob"));
        slot.clear();
        assert!(slot.current().is_none());
    }
}
