pub mod config;
pub mod crypto;
pub mod entries;
pub mod error;
pub mod habits;
pub mod journal;
pub mod model;
pub mod reminders;
pub mod remote;
pub mod rewards;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod templates;
pub mod xp;

pub use config::{JournalConfig, KdfParams};
pub use crypto::Codec;
pub use entries::EntryManager;
pub use error::JournalError;
pub use habits::{HabitManager, HabitUpdate, NewHabit};
pub use journal::Journal;
pub use model::{
    Badge, Entry, Habit, HabitType, HabitValue, Line, LineType, Medal, MedalTier, Recurrence,
    Reminder, Template, TemplateLine, UserDataBlob, XpEntry, XpSource,
};
pub use reminders::{NewReminder, ReminderManager, ReminderUpdate};
pub use remote::{BlobStore, FileBlobStore, MemoryBlobStore, RemoteStore, UserRecord};
pub use rewards::{BadgeUpdate, RewardManager};
pub use session::{CredentialStore, Session};
pub use storage::DataCache;
pub use templates::{NewTemplate, TemplateManager, TemplateUpdate};
pub use xp::{DailyXp, MonthSummary, XpChange, XpLedger};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, JournalError>;


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_saved_entry_survives_a_reload() {
        let tmp_dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBlobStore::new());
        let journal = Journal::new(&testing::config(tmp_dir.path()), backend.clone());

        journal.register("alice", "pw123").unwrap();
        assert!(journal.entries().load_entries().is_empty());

        let entry = Entry {
            id: "2026-02-08".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, 8).unwrap(),
            lines: vec![Line {
                id: "l1".to_string(),
                line_type: LineType::Text,
                content: "hello".to_string(),
                checked: None,
                xp: None,
            }],
            habits: Default::default(),
        };
        journal.entries().save_entries(vec![entry]).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!journal.has_unsynced_changes());

        let reloaded = journal.load_all_data().unwrap();
        assert_eq!(reloaded.entries[0].id, "2026-02-08");
        assert_eq!(reloaded.entries[0].lines[0].content, "hello");

        let other = Journal::new(&testing::config(tmp_dir.path()), backend);
        other.login("alice", "pw123").unwrap();
        assert_eq!(other.entries().load_entries().len(), 1);
    }

    #[test]
    fn test_remembered_session_is_restored() {
        let tmp_dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBlobStore::new());
        let config = testing::config(tmp_dir.path());

        let first = Journal::new(&config, backend.clone());
        first.register("alice", "pw123").unwrap();
        let feb8 = NaiveDate::from_ymd_opt(2026, 2, 8).unwrap();
        first.xp().add_xp(feb8, 10, XpSource::Task, "t", "T").unwrap();
        first.force_save().unwrap();
        drop(first);

        let second = Journal::new(&config, backend);
        assert!(second.restore_session().unwrap());
        assert_eq!(second.current_user().as_deref(), Some("alice"));
        assert_eq!(second.xp().get_total_xp(), 10);
    }

    #[test]
    fn test_failed_restore_logs_out_completely() {
        let tmp_dir = TempDir::new().unwrap();
        let config = testing::config(tmp_dir.path());
        CredentialStore::new(config.credentials_file())
            .save(&Session::new("ghost", "pw"))
            .unwrap();

        let journal = Journal::new(&config, Arc::new(MemoryBlobStore::new()));
        assert!(journal.restore_session().is_err());
        assert!(!journal.is_logged_in());
        assert!(!journal.cache().is_initialized());
        assert!(!journal.restore_session().unwrap());
    }

    #[test]
    fn test_logout_flushes_and_forgets() {
        let tmp_dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBlobStore::new());
        let config = testing::config(tmp_dir.path());
        let journal = Journal::new(&config, backend.clone());
        journal.register("alice", "pw123").unwrap();
        journal
            .entries()
            .get_or_create_day(NaiveDate::from_ymd_opt(2026, 2, 8).unwrap())
            .unwrap();

        journal.logout().unwrap();
        assert!(!journal.is_logged_in());
        assert!(journal.entries().load_entries().is_empty());
        assert!(matches!(journal.load_all_data(), Err(JournalError::NoSession)));

        journal.login("alice", "pw123").unwrap();
        assert_eq!(journal.entries().load_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_switching_users_keeps_pending_edits() {
        let tmp_dir = TempDir::new().unwrap();
        let config = testing::config(tmp_dir.path()).with_save_debounce(Duration::from_secs(60));
        let journal = Journal::new(&config, Arc::new(MemoryBlobStore::new()));
        let feb8 = NaiveDate::from_ymd_opt(2026, 2, 8).unwrap();

        journal.register("alice", "pw123").unwrap();
        journal.xp().add_xp(feb8, 10, XpSource::Task, "t", "T").unwrap();
        assert!(journal.has_unsynced_changes());

        journal.register("bob", "hunter2").unwrap();
        assert_eq!(journal.current_user().as_deref(), Some("bob"));
        assert_eq!(journal.xp().get_total_xp(), 0);

        journal.logout().unwrap();
        journal.login("alice", "pw123").unwrap();
        assert_eq!(journal.xp().get_total_xp(), 10);
    }

    struct FailingLoads {
        inner: MemoryBlobStore,
        finds: AtomicUsize,
        allowed: usize,
    }

    impl BlobStore for FailingLoads {
        fn insert_user(&self, record: UserRecord) -> Result<()> {
            self.inner.insert_user(record)
        }

        fn find_user(&self, username: &str) -> Result<Option<UserRecord>> {
            if self.finds.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(JournalError::Persistence("connection reset".to_string()));
            }
            self.inner.find_user(username)
        }

        fn update_blob(&self, username: &str, encrypted_data: &str) -> Result<()> {
            self.inner.update_blob(username, encrypted_data)
        }
    }

    #[test]
    fn test_failed_load_after_login_forgets_credentials() {
        let tmp_dir = TempDir::new().unwrap();
        let config = testing::config(tmp_dir.path());
        let backend = MemoryBlobStore::new();

        let first = Journal::new(&config, Arc::new(backend.clone()));
        first.register("alice", "pw123").unwrap();
        drop(first);
        assert!(config.credentials_file().exists());

        // The credential check succeeds, the following data load does not.
        let flaky = FailingLoads {
            inner: backend,
            finds: AtomicUsize::new(0),
            allowed: 1,
        };
        let journal = Journal::new(&config, Arc::new(flaky));
        let err = journal.login("alice", "pw123").unwrap_err();
        assert!(matches!(err, JournalError::Persistence(_)));
        assert!(!journal.is_logged_in());
        assert!(!journal.cache().is_initialized());
        assert!(!config.credentials_file().exists());
    }

    #[test]
    fn test_save_all_data_replaces_the_stored_blob() {
        let journal = testing::journal();
        let mut blob = journal.cache().snapshot();
        blob.entries.push(Entry::with_lines(
            NaiveDate::from_ymd_opt(2026, 2, 8).unwrap(),
            vec![Line::new(LineType::Text, "written directly")],
        ));
        journal.save_all_data(&blob).unwrap();

        let stored = journal.load_all_data().unwrap();
        assert_eq!(stored.entries.len(), 1);
        assert_eq!(stored.entries[0].lines[0].content, "written directly");

        journal.logout().unwrap();
        assert!(matches!(
            journal.save_all_data(&blob),
            Err(JournalError::NoSession)
        ));
    }

    #[test]
    fn test_wrong_password_leaves_no_session() {
        let journal = testing::journal();
        journal.logout().unwrap();
        let err = journal.login("alice", "wrong").unwrap_err();
        assert!(err.is_auth());
        assert!(!journal.is_logged_in());
    }
}
