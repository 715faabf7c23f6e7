//! Application root: owns the session, the data cache and the save scheduler,
//! and hands out the per-concern managers that operate on the cache.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::JournalConfig;
use crate::crypto::Codec;
use crate::entries::EntryManager;
use crate::error::JournalError;
use crate::habits::HabitManager;
use crate::model::UserDataBlob;
use crate::reminders::ReminderManager;
use crate::remote::{BlobStore, FileBlobStore, RemoteStore};
use crate::rewards::RewardManager;
use crate::session::{CredentialStore, Session, SessionSlot};
use crate::storage::DataCache;
use crate::templates::TemplateManager;
use crate::xp::XpLedger;

pub struct Journal {
    remote: RemoteStore,
    session: SessionSlot,
    cache: DataCache,
    credentials: CredentialStore,
}

impl Journal {
    pub fn new(config: &JournalConfig, backend: Arc<dyn BlobStore>) -> Self {
        let codec = Codec::new(&config.app_secret, config.kdf);
        let remote = RemoteStore::new(backend, codec);
        let session = SessionSlot::default();
        let cache = DataCache::new(remote.clone(), session.clone(), config.save_debounce);
        Self {
            remote,
            session,
            cache,
            credentials: CredentialStore::new(config.credentials_file()),
        }
    }

    /// A journal backed by the JSON user file in the configured data dir.
    pub fn open(config: &JournalConfig) -> Self {
        Self::new(config, Arc::new(FileBlobStore::new(config.store_file())))
    }

    pub fn register(&self, username: &str, password: &str) -> crate::Result<()> {
        let session = self.remote.register(username, password)?;
        self.start_session(session)
    }

    pub fn login(&self, username: &str, password: &str) -> crate::Result<()> {
        let session = self.remote.login(username, password)?;
        self.start_session(session)
    }

    fn start_session(&self, session: Session) -> crate::Result<()> {
        self.close_current_session();
        if let Err(e) = self.credentials.save(&session) {
            warn!("Could not remember session: {}", e);
        }
        self.session.set(session);
        self.initialize_storage()
    }

    /// Resume a session remembered from a previous run. Returns `Ok(false)`
    /// when nothing was remembered. A failed load logs out completely.
    pub fn restore_session(&self) -> crate::Result<bool> {
        let Some(session) = self.credentials.load() else {
            return Ok(false);
        };
        info!("Restoring session for {}", session.username);
        self.close_current_session();
        self.session.set(session);
        self.initialize_storage()?;
        Ok(true)
    }

    /// Hydrate the cache from the remote store. On failure the session and
    /// remembered credentials are dropped.
    pub fn initialize_storage(&self) -> crate::Result<()> {
        let loaded = self.session.require().and_then(|session| {
            let blob = self.remote.load_all(&session)?;
            Ok((session, blob))
        });
        match loaded {
            Ok((session, blob)) => {
                self.cache.initialize(&session.username, blob);
                Ok(())
            }
            Err(e) => {
                error!("Initial data load failed, logging out: {}", e);
                self.discard_session();
                Err(e)
            }
        }
    }

    /// Fetch and decrypt the stored blob without touching the cache.
    pub fn load_all_data(&self) -> crate::Result<UserDataBlob> {
        let session = self.session.require()?;
        self.remote.load_all(&session)
    }

    /// Encrypt and store the given blob for the current user.
    pub fn save_all_data(&self, blob: &UserDataBlob) -> crate::Result<()> {
        let session = self.session.require()?;
        self.remote.save_all(&session, blob)
    }

    /// Flush pending edits, then forget the session and the cached data.
    pub fn logout(&self) -> crate::Result<()> {
        self.close_current_session();
        self.discard_session();
        info!("Logged out");
        Ok(())
    }

    // Flush the signed-in user's pending edits before the cache changes hands.
    fn close_current_session(&self) {
        if self.cache.is_initialized() && self.cache.has_unsynced_changes() {
            if let Err(e) = self.cache.force_save() {
                warn!("Unsynced changes were lost when closing the session: {}", e);
            }
        }
        self.cache.reset();
        self.session.clear();
    }

    fn discard_session(&self) {
        self.cache.reset();
        self.session.clear();
        if let Err(e) = self.credentials.clear() {
            warn!("Could not clear remembered credentials: {}", e);
        }
    }

    pub fn current_user(&self) -> Option<String> {
        self.session.username()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.current().is_some()
    }

    pub fn force_save(&self) -> crate::Result<()> {
        if !self.cache.is_initialized() {
            return Err(JournalError::NotInitialized);
        }
        self.cache.force_save()
    }

    pub fn has_unsynced_changes(&self) -> bool {
        self.cache.has_unsynced_changes()
    }

    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    pub fn entries(&self) -> EntryManager {
        EntryManager::with_cache(self.cache.clone())
    }

    pub fn templates(&self) -> TemplateManager {
        TemplateManager::with_cache(self.cache.clone())
    }

    pub fn habits(&self) -> HabitManager {
        HabitManager::with_cache(self.cache.clone())
    }

    pub fn xp(&self) -> XpLedger {
        XpLedger::with_cache(self.cache.clone())
    }

    pub fn rewards(&self) -> RewardManager {
        RewardManager::with_cache(self.cache.clone())
    }

    pub fn reminders(&self) -> ReminderManager {
        ReminderManager::with_cache(self.cache.clone())
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.close_current_session();
    }
}
