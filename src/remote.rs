//! Passive storage of one encrypted blob per username, plus the adapter that
//! authenticates users and moves the blob through the crypto codec.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::crypto::Codec;
use crate::error::JournalError;
use crate::model::UserDataBlob;
use crate::session::Session;

/// One row of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub encrypted_data: String,
}

/// The remote table. Implementations never see plaintext.
pub trait BlobStore: Send + Sync {
    /// Fails with `DuplicateUser` when the username is taken.
    fn insert_user(&self, record: UserRecord) -> crate::Result<()>;
    fn find_user(&self, username: &str) -> crate::Result<Option<UserRecord>>;
    fn update_blob(&self, username: &str, encrypted_data: &str) -> crate::Result<()>;
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    rows: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn insert_user(&self, record: UserRecord) -> crate::Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| JournalError::Storage(e.to_string()))?;
        if rows.contains_key(&record.username) {
            return Err(JournalError::DuplicateUser(record.username));
        }
        rows.insert(record.username.clone(), record);
        Ok(())
    }

    fn find_user(&self, username: &str) -> crate::Result<Option<UserRecord>> {
        let rows = self
            .rows
            .read()
            .map_err(|e| JournalError::Storage(e.to_string()))?;
        Ok(rows.get(username).cloned())
    }

    fn update_blob(&self, username: &str, encrypted_data: &str) -> crate::Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| JournalError::Storage(e.to_string()))?;
        let row = rows
            .get_mut(username)
            .ok_or_else(|| JournalError::Persistence(format!("No row for user {}", username)))?;
        row.encrypted_data = encrypted_data.to_string();
        Ok(())
    }
}

/// A JSON file holding every user row; rewritten atomically on each change.
pub struct FileBlobStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    fn read_rows(&self) -> crate::Result<HashMap<String, UserRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let data =
            fs::read_to_string(&self.path).map_err(|e| JournalError::FileSystem(e.to_string()))?;
        Ok(serde_json::from_str(&data)?)
    }

    fn write_rows(&self, rows: &HashMap<String, UserRecord>) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| JournalError::FileSystem(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(rows)?;
        atomic_write(&self.path, data.as_bytes())
    }
}

impl BlobStore for FileBlobStore {
    fn insert_user(&self, record: UserRecord) -> crate::Result<()> {
        let _guard = self.lock.write().map_err(|e| JournalError::Storage(e.to_string()))?;
        let mut rows = self.read_rows()?;
        if rows.contains_key(&record.username) {
            return Err(JournalError::DuplicateUser(record.username));
        }
        rows.insert(record.username.clone(), record);
        self.write_rows(&rows)
    }

    fn find_user(&self, username: &str) -> crate::Result<Option<UserRecord>> {
        let _guard = self.lock.read().map_err(|e| JournalError::Storage(e.to_string()))?;
        Ok(self.read_rows()?.remove(username))
    }

    fn update_blob(&self, username: &str, encrypted_data: &str) -> crate::Result<()> {
        let _guard = self.lock.write().map_err(|e| JournalError::Storage(e.to_string()))?;
        let mut rows = self.read_rows()?;
        let row = rows
            .get_mut(username)
            .ok_or_else(|| JournalError::Persistence(format!("No row for user {}", username)))?;
        row.encrypted_data = encrypted_data.to_string();
        self.write_rows(&rows)
    }
}

// Write to a temporary sibling and rename into place so an interrupted write
// never leaves a truncated file behind.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> crate::Result<()> {
    use rand::{thread_rng, Rng};

    let parent = path
        .parent()
        .ok_or_else(|| JournalError::FileSystem("Invalid path".to_string()))?;
    let suffix: u64 = thread_rng().gen();
    let tmp = parent.join(format!(".tmp_journal.{}.tmp", suffix));

    fs::write(&tmp, bytes).map_err(|e| JournalError::FileSystem(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| JournalError::FileSystem(e.to_string()))?;
    Ok(())
}

/// Authenticates users and exchanges the encrypted blob with a [`BlobStore`].
#[derive(Clone)]
pub struct RemoteStore {
    backend: Arc<dyn BlobStore>,
    codec: Codec,
}

impl RemoteStore {
    pub fn new(backend: Arc<dyn BlobStore>, codec: Codec) -> Self {
        Self { backend, codec }
    }

    pub fn register(&self, username: &str, password: &str) -> crate::Result<Session> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(JournalError::InvalidInput(
                "username and password are required".to_string(),
            ));
        }

        let record = UserRecord {
            username: username.to_string(),
            password_hash: self.codec.hash_password(password),
            encrypted_data: self.codec.encrypt(&UserDataBlob::default(), password)?,
        };
        self.backend.insert_user(record).map_err(|e| {
            error!("Registration error: {}", e);
            e
        })?;

        info!("Registered user {}", username);
        Ok(Session::new(username, password))
    }

    pub fn login(&self, username: &str, password: &str) -> crate::Result<Session> {
        let username = username.trim();
        let hashed = self.codec.hash_password(password);
        let record = match self.backend.find_user(username)? {
            Some(record) if record.password_hash == hashed => record,
            _ => {
                error!("Login error: invalid credentials for {}", username);
                return Err(JournalError::InvalidCredentials);
            }
        };

        // A successful decrypt is the second password check.
        if let Err(e) = self.codec.decrypt::<UserDataBlob>(&record.encrypted_data, password) {
            error!("Login error: stored data did not decrypt for {}: {}", username, e);
            return Err(JournalError::InvalidCredentials);
        }

        info!("User {} logged in", username);
        Ok(Session::new(username, password))
    }

    pub fn load_all(&self, session: &Session) -> crate::Result<UserDataBlob> {
        let record = self
            .backend
            .find_user(&session.username)?
            .ok_or_else(|| {
                JournalError::Persistence(format!("No row for user {}", session.username))
            })?;
        let blob = self
            .codec
            .decrypt::<UserDataBlob>(&record.encrypted_data, &session.password)?
            .unwrap_or_default();
        debug!(
            "Loaded {} entries and {} ledger rows for {}",
            blob.entries.len(),
            blob.xp_history.len(),
            session.username
        );
        Ok(blob)
    }

    pub fn save_all(&self, session: &Session, blob: &UserDataBlob) -> crate::Result<()> {
        let encrypted = self.codec.encrypt(blob, &session.password)?;
        self.backend.update_blob(&session.username, &encrypted)?;
        debug!("Saved encrypted blob for {}", session.username);
        Ok(())
    }
}
