//! The authoritative in-memory copy of a user's data.
//!
//! Reads are served straight from memory. Mutations apply synchronously and
//! then arm the [`SaveScheduler`], which writes the whole blob back through the
//! remote store after a quiet period.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::JournalError;
use crate::model::{Badge, Entry, Habit, Medal, Reminder, Template, UserDataBlob, XpEntry};
use crate::remote::RemoteStore;
use crate::scheduler::SaveScheduler;
use crate::session::SessionSlot;

#[derive(Default)]
pub(crate) struct CacheState {
    pub(crate) data: UserDataBlob,
    pub(crate) initialized: bool,
    /// User whose data is loaded; saves only go out under this user's session.
    pub(crate) owner: Option<String>,
}

#[derive(Clone)]
pub struct DataCache {
    state: Arc<RwLock<CacheState>>,
    scheduler: SaveScheduler,
}

impl DataCache {
    pub fn new(remote: RemoteStore, session: SessionSlot, save_debounce: Duration) -> Self {
        let state = Arc::new(RwLock::new(CacheState::default()));
        let scheduler = SaveScheduler::new(save_debounce, state.clone(), remote, session);
        Self { state, scheduler }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the cache contents with `owner`'s freshly loaded data.
    pub fn initialize(&self, owner: &str, mut blob: UserDataBlob) {
        self.scheduler.cancel();
        blob.entries = std::mem::take(&mut blob.entries)
            .into_iter()
            .map(Entry::normalized)
            .collect();
        {
            let mut guard = self.write_guard();
            guard.data = blob;
            guard.initialized = true;
            guard.owner = Some(owner.to_string());
        }
        self.scheduler.mark_synced();
        info!("Storage initialized");
    }

    /// Forget everything and return to the uninitialized state.
    pub fn reset(&self) {
        self.scheduler.cancel();
        let mut guard = self.write_guard();
        *guard = CacheState::default();
    }

    pub fn is_initialized(&self) -> bool {
        self.read_guard().initialized
    }

    pub fn snapshot(&self) -> UserDataBlob {
        self.read(|data| data.clone())
    }

    /// Run a read-only closure. Before initialization this logs a warning and
    /// returns the empty default instead of failing.
    pub fn read<R, F>(&self, f: F) -> R
    where
        R: Default,
        F: FnOnce(&UserDataBlob) -> R,
    {
        let guard = self.read_guard();
        if !guard.initialized {
            warn!("Storage read before initialization, returning empty data");
            return R::default();
        }
        f(&guard.data)
    }

    /// Apply a mutation and schedule a save.
    pub fn mutate<R, F>(&self, f: F) -> crate::Result<R>
    where
        F: FnOnce(&mut UserDataBlob) -> R,
    {
        let result = {
            let mut guard = self.write_guard();
            if !guard.initialized {
                warn!("Storage mutated before initialization");
                return Err(JournalError::NotInitialized);
            }
            f(&mut guard.data)
        };
        self.scheduler.schedule();
        Ok(result)
    }

    pub fn scheduler(&self) -> &SaveScheduler {
        &self.scheduler
    }

    pub fn force_save(&self) -> crate::Result<()> {
        self.scheduler.force_save()
    }

    pub fn pending_writes(&self) -> u64 {
        self.scheduler.pending_writes()
    }

    pub fn has_unsynced_changes(&self) -> bool {
        self.scheduler.has_unsynced_changes()
    }

    pub fn load_entries(&self) -> Vec<Entry> {
        self.read(|data| data.entries.clone())
    }

    /// Replace every stored day. Ids are derived from dates, empty days get a
    /// blank line, and a date may appear only once.
    pub fn save_entries(&self, entries: Vec<Entry>) -> crate::Result<()> {
        let entries: Vec<Entry> = entries.into_iter().map(Entry::normalized).collect();
        let mut seen = HashSet::new();
        if let Some(duplicate) = entries.iter().find(|e| !seen.insert(e.id.clone())) {
            return Err(JournalError::InvalidInput(format!(
                "day {} appears more than once",
                duplicate.id
            )));
        }
        self.mutate(|data| data.entries = entries)
    }

    pub fn load_habits(&self) -> Vec<Habit> {
        self.read(|data| {
            let mut habits = data.habits.clone();
            habits.sort_by_key(|h| h.order);
            habits
        })
    }

    pub fn save_habits(&self, habits: Vec<Habit>) -> crate::Result<()> {
        self.mutate(|data| data.habits = habits)
    }

    pub fn load_templates(&self) -> Vec<Template> {
        self.read(|data| data.templates.clone())
    }

    pub fn save_templates(&self, templates: Vec<Template>) -> crate::Result<()> {
        self.mutate(|data| data.templates = templates)
    }

    pub fn load_reminders(&self) -> Vec<Reminder> {
        self.read(|data| data.reminders.clone())
    }

    pub fn save_reminders(&self, reminders: Vec<Reminder>) -> crate::Result<()> {
        self.mutate(|data| data.reminders = reminders)
    }

    pub fn load_xp_history(&self) -> Vec<XpEntry> {
        self.read(|data| data.xp_history.clone())
    }

    pub fn load_badges(&self) -> Vec<Badge> {
        self.read(|data| data.badges.clone())
    }

    pub fn load_medals(&self) -> Vec<Medal> {
        self.read(|data| data.medals.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KdfParams;
    use crate::crypto::Codec;
    use crate::model::Line;
    use crate::remote::MemoryBlobStore;
    use chrono::NaiveDate;
    use tokio_test::{assert_err, assert_ok};

    fn cache_for(debounce: Duration) -> (DataCache, RemoteStore, SessionSlot) {
        let remote = RemoteStore::new(
            Arc::new(MemoryBlobStore::new()),
            Codec::new("test-secret", KdfParams::insecure_fast()),
        );
        let session = SessionSlot::default();
        session.set(remote.register("alice", "pw123").unwrap());
        let cache = DataCache::new(remote.clone(), session.clone(), debounce);
        (cache, remote, session)
    }

    fn day(d: u32) -> Entry {
        Entry::with_lines(
            NaiveDate::from_ymd_opt(2026, 2, d).unwrap(),
            vec![Line::new(crate::model::LineType::Text, "hello")],
        )
    }

    #[test]
    fn test_reads_before_initialization_are_empty() {
        let (cache, _, _) = cache_for(Duration::from_millis(10));
        assert!(cache.load_entries().is_empty());
        assert!(cache.load_habits().is_empty());
        assert_err!(cache.save_entries(vec![day(8)]));
    }

    #[test]
    fn test_without_a_runtime_saves_happen_immediately() {
        let (cache, remote, session) = cache_for(Duration::from_secs(60));
        cache.initialize("alice", UserDataBlob::default());
        assert_ok!(cache.save_entries(vec![day(8)]));

        assert_eq!(cache.pending_writes(), 0);
        let stored = remote.load_all(&session.require().unwrap()).unwrap();
        assert_eq!(stored.entries[0].id, "2026-02-08");
    }

    #[tokio::test]
    async fn test_bursts_collapse_into_one_delayed_save() {
        let (cache, remote, session) = cache_for(Duration::from_millis(50));
        cache.initialize("alice", UserDataBlob::default());

        for d in 1..=5 {
            let mut entries = cache.load_entries();
            entries.push(day(d));
            cache.save_entries(entries).unwrap();
        }
        assert_eq!(cache.pending_writes(), 5);
        let before = remote.load_all(&session.require().unwrap()).unwrap();
        assert!(before.entries.is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!cache.has_unsynced_changes());
        let after = remote.load_all(&session.require().unwrap()).unwrap();
        assert_eq!(after.entries.len(), 5);
    }

    #[tokio::test]
    async fn test_force_save_writes_without_waiting() {
        let (cache, remote, session) = cache_for(Duration::from_secs(60));
        cache.initialize("alice", UserDataBlob::default());
        cache.save_entries(vec![day(8)]).unwrap();
        assert!(cache.has_unsynced_changes());

        assert_ok!(cache.force_save());
        assert!(!cache.has_unsynced_changes());
        let stored = remote.load_all(&session.require().unwrap()).unwrap();
        assert_eq!(stored.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_background_save_keeps_changes_unsynced() {
        let (cache, _, session) = cache_for(Duration::from_millis(20));
        cache.initialize("alice", UserDataBlob::default());
        session.clear();
        cache.save_entries(vec![day(8)]).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.has_unsynced_changes());
        assert_eq!(cache.load_entries().len(), 1);
        assert!(matches!(cache.force_save(), Err(JournalError::NoSession)));
    }

    #[test]
    fn test_save_refuses_another_users_session() {
        let (cache, remote, session) = cache_for(Duration::from_secs(60));
        cache.initialize("alice", UserDataBlob::default());
        session.set(remote.register("bob", "hunter2").unwrap());

        let result = cache.force_save();
        assert!(matches!(result, Err(JournalError::Persistence(_))));
        let bob = remote.load_all(&session.require().unwrap()).unwrap();
        assert!(bob.entries.is_empty());
    }

    #[test]
    fn test_saved_days_are_normalized() {
        let (cache, _, _) = cache_for(Duration::from_millis(10));
        cache.initialize("alice", UserDataBlob::default());

        let mut odd = day(8);
        odd.id = "not-a-date".to_string();
        odd.lines.clear();
        assert_ok!(cache.save_entries(vec![odd]));

        let stored = cache.load_entries();
        assert_eq!(stored[0].id, "2026-02-08");
        assert_eq!(stored[0].lines.len(), 1);
        assert_eq!(stored[0].lines[0].content, "");

        let result = cache.save_entries(vec![day(9), day(9)]);
        assert!(matches!(result, Err(JournalError::InvalidInput(_))));
        assert_eq!(cache.load_entries().len(), 1);
    }

    #[test]
    fn test_loaded_days_are_normalized() {
        let (cache, _, _) = cache_for(Duration::from_millis(10));
        let mut blob = UserDataBlob::default();
        let mut empty = day(8);
        empty.lines.clear();
        blob.entries.push(empty);
        cache.initialize("alice", blob);
        assert_eq!(cache.load_entries()[0].lines.len(), 1);
    }

    #[test]
    fn test_habits_come_back_in_display_order() {
        let (cache, _, _) = cache_for(Duration::from_millis(10));
        cache.initialize("alice", UserDataBlob::default());
        let make = |id: &str, order| Habit {
            id: id.to_string(),
            name: id.to_string(),
            habit_type: crate::model::HabitType::Checkbox,
            icon: String::new(),
            color: String::new(),
            order,
            goal: None,
            xp: None,
            visible: true,
        };
        cache
            .save_habits(vec![make("b", 1), make("a", 0), make("c", 2)])
            .unwrap();
        let ids: Vec<String> = cache.load_habits().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
