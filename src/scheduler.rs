//! Single-slot debounced writer for the data cache.
//!
//! Every mutation replaces the pending save with a new one that fires after the
//! quiet interval, so bursts of edits collapse into one encrypted write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::JournalError;
use crate::remote::RemoteStore;
use crate::session::SessionSlot;
use crate::storage::CacheState;

#[derive(Clone)]
pub struct SaveScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    delay: Duration,
    state: Arc<RwLock<CacheState>>,
    remote: RemoteStore,
    session: SessionSlot,
    pending: Mutex<Option<JoinHandle<()>>>,
    mutations: AtomicU64,
    saved: AtomicU64,
}

impl SchedulerInner {
    fn flush(&self) -> crate::Result<()> {
        let session = self.session.require()?;
        let seq = self.mutations.load(Ordering::SeqCst);
        let blob = {
            let guard = self
                .state
                .read()
                .map_err(|e| JournalError::Storage(e.to_string()))?;
            if !guard.initialized {
                return Err(JournalError::NotInitialized);
            }
            if guard.owner.as_deref() != Some(session.username.as_str()) {
                return Err(JournalError::Persistence(format!(
                    "cached data does not belong to {}",
                    session.username
                )));
            }
            guard.data.clone()
        };

        self.remote.save_all(&session, &blob).map_err(|e| match e {
            JournalError::Persistence(_) | JournalError::Encrypt(_) => e,
            other => JournalError::Persistence(other.to_string()),
        })?;
        self.saved.fetch_max(seq, Ordering::SeqCst);
        Ok(())
    }

    fn take_pending(&self) -> Option<JoinHandle<()>> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

impl SaveScheduler {
    pub(crate) fn new(
        delay: Duration,
        state: Arc<RwLock<CacheState>>,
        remote: RemoteStore,
        session: SessionSlot,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                delay,
                state,
                remote,
                session,
                pending: Mutex::new(None),
                mutations: AtomicU64::new(0),
                saved: AtomicU64::new(0),
            }),
        }
    }

    /// Record a mutation and (re)arm the delayed save.
    pub fn schedule(&self) {
        self.inner.mutations.fetch_add(1, Ordering::SeqCst);

        let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        match Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                *pending = Some(handle.spawn(async move {
                    tokio::time::sleep(inner.delay).await;
                    let worker = Arc::clone(&inner);
                    match tokio::task::spawn_blocking(move || worker.flush()).await {
                        Ok(Ok(())) => debug!("Background save completed"),
                        Ok(Err(e)) => error!("Background save failed: {}", e),
                        Err(e) => error!("Background save task failed: {}", e),
                    }
                }));
            }
            Err(_) => {
                // No timer without a runtime; persist on the caller instead.
                debug!("No async runtime available, saving immediately");
                if let Err(e) = self.inner.flush() {
                    error!("Save failed: {}", e);
                }
            }
        }
    }

    /// Cancel any pending save and write the current cache state now.
    pub fn force_save(&self) -> crate::Result<()> {
        if let Some(previous) = self.inner.take_pending() {
            previous.abort();
        }
        self.inner.flush().map_err(|e| {
            error!("Forced save failed: {}", e);
            e
        })
    }

    /// Drop the pending save without writing.
    pub fn cancel(&self) {
        if let Some(previous) = self.inner.take_pending() {
            previous.abort();
        }
    }

    /// Mutations applied to the cache but not yet confirmed by a save.
    pub fn pending_writes(&self) -> u64 {
        let mutations = self.inner.mutations.load(Ordering::SeqCst);
        let saved = self.inner.saved.load(Ordering::SeqCst);
        mutations.saturating_sub(saved)
    }

    pub fn has_unsynced_changes(&self) -> bool {
        self.pending_writes() > 0
    }

    pub(crate) fn mark_synced(&self) {
        let seq = self.inner.mutations.load(Ordering::SeqCst);
        self.inner.saved.fetch_max(seq, Ordering::SeqCst);
    }
}
